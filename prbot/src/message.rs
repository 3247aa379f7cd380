/// Footer appended to every comment the bot posts.
pub fn message_footer() -> &'static str {
    "---\n\n_:robot: Powered by prbot._"
}
