//! Comment command language: one command per line, addressed to the bot by
//! nickname, e.g. `bot qa+` or `bot lock+ freeze period`.

use crate::{
    context::Context,
    database::store::PullRequestStore,
    message::message_footer,
    models::{MergeStrategy, QaStatus},
    sync::{SyncOrchestrator, SyncStateBuilder},
    Error, Result,
};
use github::ReactionType;
use log::info;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseCommandError {
    #[error("Invalid command: Unknown command \"{0}\"")]
    UnknownCommand(String),

    #[error("Invalid command: Unexpected arguments for command")]
    UnexpectedArguments,

    #[error("Invalid command: Missing reviewers to set")]
    MissingReviewersToSet,

    #[error("Invalid command: Missing reviewers to unset")]
    MissingReviewersToUnset,

    #[error("Invalid command: Missing strategy name")]
    MissingStrategyName,

    #[error("Invalid command: Invalid merge strategy: {0}")]
    InvalidMergeStrategy(String),

    #[error("Invalid command: Missing labels to set")]
    MissingLabelsToSet,

    #[error("Invalid command: Missing labels to unset")]
    MissingLabelsToUnset,

    #[error("Invalid command: Missing GIF query")]
    MissingGifQuery,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetQa(QaStatus),
    SetChecksEnabled(bool),
    SetAutomerge(bool),
    SetLocked { value: bool, comment: Option<String> },
    AssignReviewers(Vec<String>),
    UnassignReviewers(Vec<String>),
    SetStrategy(Option<MergeStrategy>),
    Merge(Option<MergeStrategy>),
    AssignLabels(Vec<String>),
    UnassignLabels(Vec<String>),
    Ping,
    Gif(String),
    Sync,
}

#[derive(Debug)]
pub struct CommandOutput {
    pub needs_sync: bool,
}

impl Command {
    /// Parse one comment line. `Ok(None)` means the line is not addressed to
    /// the bot at all; parse errors are lines addressed to the bot that do
    /// not form a valid command.
    pub fn parse(line: &str, bot_nickname: &str) -> Result<Option<Self>, ParseCommandError> {
        let tokens: Vec<&str> = line.split(' ').collect();

        let (nickname, verb, args) = match tokens.as_slice() {
            [nickname, verb, args @ ..] => (*nickname, *verb, args),
            _ => return Ok(None),
        };

        if nickname != bot_nickname {
            return Ok(None);
        }

        let command = match verb {
            "qa+" => Self::no_args(args, Command::SetQa(QaStatus::Pass))?,
            "qa-" => Self::no_args(args, Command::SetQa(QaStatus::Fail))?,
            "qa?" => Self::no_args(args, Command::SetQa(QaStatus::Waiting))?,
            "noqa+" => Self::no_args(args, Command::SetQa(QaStatus::Skipped))?,
            "nochecks-" => Self::no_args(args, Command::SetChecksEnabled(true))?,
            "nochecks+" => Self::no_args(args, Command::SetChecksEnabled(false))?,
            "automerge+" => Self::no_args(args, Command::SetAutomerge(true))?,
            "automerge-" => Self::no_args(args, Command::SetAutomerge(false))?,
            "lock+" => Command::SetLocked {
                value: true,
                comment: Self::joined_args(args),
            },
            "lock-" => Command::SetLocked {
                value: false,
                comment: Self::joined_args(args),
            },
            "r+" => {
                if args.is_empty() {
                    return Err(ParseCommandError::MissingReviewersToSet);
                }
                Command::AssignReviewers(Self::owned(args))
            }
            "r-" => {
                if args.is_empty() {
                    return Err(ParseCommandError::MissingReviewersToUnset);
                }
                Command::UnassignReviewers(Self::owned(args))
            }
            "strategy+" => match args {
                [] => return Err(ParseCommandError::MissingStrategyName),
                [strategy] => Command::SetStrategy(Some(Self::strategy(strategy)?)),
                _ => return Err(ParseCommandError::UnexpectedArguments),
            },
            "strategy?" => Self::no_args(args, Command::SetStrategy(None))?,
            "merge" => match args {
                [] => Command::Merge(None),
                [strategy] => Command::Merge(Some(Self::strategy(strategy)?)),
                _ => return Err(ParseCommandError::UnexpectedArguments),
            },
            "labels+" => {
                if args.is_empty() {
                    return Err(ParseCommandError::MissingLabelsToSet);
                }
                Command::AssignLabels(Self::owned(args))
            }
            "labels-" => {
                if args.is_empty() {
                    return Err(ParseCommandError::MissingLabelsToUnset);
                }
                Command::UnassignLabels(Self::owned(args))
            }
            "ping" => Self::no_args(args, Command::Ping)?,
            "gif" => {
                if args.is_empty() {
                    return Err(ParseCommandError::MissingGifQuery);
                }
                Command::Gif(args.join(" "))
            }
            "sync" => Self::no_args(args, Command::Sync)?,
            unknown => return Err(ParseCommandError::UnknownCommand(unknown.to_owned())),
        };

        Ok(Some(command))
    }

    fn no_args(args: &[&str], command: Command) -> Result<Command, ParseCommandError> {
        if args.is_empty() {
            Ok(command)
        } else {
            Err(ParseCommandError::UnexpectedArguments)
        }
    }

    fn joined_args(args: &[&str]) -> Option<String> {
        if args.is_empty() {
            None
        } else {
            Some(args.join(" "))
        }
    }

    fn owned(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| (*s).to_owned()).collect()
    }

    fn strategy(value: &str) -> Result<MergeStrategy, ParseCommandError> {
        value
            .parse()
            .map_err(|_| ParseCommandError::InvalidMergeStrategy(value.to_owned()))
    }
}

/// Execution context for one command: who sent it, where, and through which
/// comment (external callers have no comment to react to).
pub struct CommandContext<'a> {
    pub ctx: &'a Context,
    pub owner: &'a str,
    pub name: &'a str,
    pub number: u64,
    pub author: &'a str,
    pub comment_id: Option<u64>,
    pub command: Option<&'a str>,
}

impl<'a> CommandContext<'a> {
    async fn add_reaction(&self, reaction: ReactionType) -> Result<()> {
        if let Some(comment_id) = self.comment_id {
            self.ctx
                .api
                .add_reaction(self.owner, self.name, comment_id, reaction)
                .await?;
        }

        Ok(())
    }

    async fn respond_to_author(&self, message: &str) -> Result<()> {
        let mut comment = format!("{}\n{}", message, message_footer());
        if let Some(command) = self.command {
            comment = format!("> {}\n\n{}", command, comment);
        }

        self.ctx
            .api
            .create_comment(self.owner, self.name, self.number, &comment)
            .await?;

        Ok(())
    }
}

impl Command {
    pub async fn execute(&self, ctx: &CommandContext<'_>) -> Result<CommandOutput> {
        match self {
            Command::SetQa(status) => self.execute_set_qa(ctx, *status).await,
            Command::SetChecksEnabled(value) => self.execute_set_checks_enabled(ctx, *value).await,
            Command::SetAutomerge(value) => self.execute_set_automerge(ctx, *value).await,
            Command::SetLocked { value, comment } => {
                self.execute_set_locked(ctx, *value, comment.as_deref()).await
            }
            Command::AssignReviewers(reviewers) => {
                ctx.add_reaction(ReactionType::Eyes).await?;
                ctx.ctx
                    .api
                    .add_reviewers(ctx.owner, ctx.name, ctx.number, reviewers)
                    .await?;
                Ok(CommandOutput { needs_sync: true })
            }
            Command::UnassignReviewers(reviewers) => {
                ctx.add_reaction(ReactionType::Eyes).await?;
                ctx.ctx
                    .api
                    .remove_reviewers(ctx.owner, ctx.name, ctx.number, reviewers)
                    .await?;
                Ok(CommandOutput { needs_sync: true })
            }
            Command::SetStrategy(strategy) => {
                ctx.add_reaction(ReactionType::Eyes).await?;
                ctx.ctx
                    .pull_request_store
                    .set_strategy_override(ctx.owner, ctx.name, ctx.number, *strategy)
                    .await?;
                Ok(CommandOutput { needs_sync: true })
            }
            Command::Merge(strategy) => self.execute_merge(ctx, *strategy).await,
            Command::AssignLabels(labels) => {
                ctx.add_reaction(ReactionType::Eyes).await?;
                ctx.ctx
                    .api
                    .add_labels(ctx.owner, ctx.name, ctx.number, labels)
                    .await?;
                Ok(CommandOutput { needs_sync: false })
            }
            Command::UnassignLabels(labels) => {
                ctx.add_reaction(ReactionType::Eyes).await?;
                let existing = ctx.ctx.api.labels(ctx.owner, ctx.name, ctx.number).await?;
                let remaining: Vec<String> = existing
                    .into_iter()
                    .filter(|label| !labels.contains(label))
                    .collect();
                ctx.ctx
                    .api
                    .replace_labels(ctx.owner, ctx.name, ctx.number, &remaining)
                    .await?;
                Ok(CommandOutput { needs_sync: false })
            }
            Command::Ping => {
                ctx.add_reaction(ReactionType::Eyes).await?;
                ctx.respond_to_author("Pong!").await?;
                Ok(CommandOutput { needs_sync: false })
            }
            Command::Gif(search) => {
                let gif = ctx.ctx.gif.query_first_match(search).await?;
                ctx.add_reaction(ReactionType::Eyes).await?;

                match gif {
                    Some(url) => ctx.respond_to_author(&format!("![gif]({})", url)).await?,
                    None => {
                        ctx.respond_to_author("No GIF found for your query... :cry:")
                            .await?
                    }
                }
                Ok(CommandOutput { needs_sync: false })
            }
            Command::Sync => {
                info!("manual sync requested by {}", ctx.author);
                SyncOrchestrator::new(ctx.ctx)
                    .process(ctx.owner, ctx.name, ctx.number, true)
                    .await?;
                ctx.add_reaction(ReactionType::Eyes).await?;
                Ok(CommandOutput { needs_sync: false })
            }
        }
    }

    async fn execute_set_qa(
        &self,
        ctx: &CommandContext<'_>,
        status: QaStatus,
    ) -> Result<CommandOutput> {
        info!("marking QA as {} on behalf of {}", status, ctx.author);

        ctx.ctx
            .pull_request_store
            .set_qa_status(ctx.owner, ctx.name, ctx.number, status)
            .await?;

        ctx.add_reaction(ReactionType::Eyes).await?;
        ctx.respond_to_author(&format!(
            "QA status is marked as **{}** by **{}**.",
            status, ctx.author
        ))
        .await?;

        Ok(CommandOutput { needs_sync: true })
    }

    async fn execute_set_checks_enabled(
        &self,
        ctx: &CommandContext<'_>,
        value: bool,
    ) -> Result<CommandOutput> {
        ctx.ctx
            .pull_request_store
            .set_checks_enabled(ctx.owner, ctx.name, ctx.number, value)
            .await?;

        ctx.add_reaction(ReactionType::Eyes).await?;
        if value {
            ctx.respond_to_author(&format!("Checks were enabled by **{}**.", ctx.author))
                .await?;
        } else {
            ctx.respond_to_author(&format!("Checks were disabled by **{}**.", ctx.author))
                .await?;
        }

        Ok(CommandOutput { needs_sync: true })
    }

    async fn execute_set_automerge(
        &self,
        ctx: &CommandContext<'_>,
        value: bool,
    ) -> Result<CommandOutput> {
        ctx.ctx
            .pull_request_store
            .set_automerge(ctx.owner, ctx.name, ctx.number, value)
            .await?;

        ctx.add_reaction(ReactionType::Eyes).await?;
        if value {
            ctx.respond_to_author("Pull request automerge is enabled.").await?;
        } else {
            ctx.respond_to_author("Pull request automerge is disabled.").await?;
        }

        Ok(CommandOutput { needs_sync: true })
    }

    async fn execute_set_locked(
        &self,
        ctx: &CommandContext<'_>,
        value: bool,
        comment: Option<&str>,
    ) -> Result<CommandOutput> {
        ctx.ctx
            .pull_request_store
            .set_locked(ctx.owner, ctx.name, ctx.number, value)
            .await?;

        ctx.add_reaction(ReactionType::Eyes).await?;
        match (value, comment) {
            (true, Some(comment)) => {
                ctx.respond_to_author(&format!("Pull request is now locked: {}.", comment))
                    .await?
            }
            (true, None) => ctx.respond_to_author("Pull request is now locked.").await?,
            (false, _) => ctx.respond_to_author("Pull request is now unlocked.").await?,
        }

        Ok(CommandOutput { needs_sync: true })
    }

    async fn execute_merge(
        &self,
        ctx: &CommandContext<'_>,
        strategy: Option<MergeStrategy>,
    ) -> Result<CommandOutput> {
        let state = SyncStateBuilder::new(ctx.ctx)
            .build(ctx.owner, ctx.name, ctx.number)
            .await?;
        let strategy = strategy.unwrap_or(state.merge_strategy);

        let result = ctx
            .ctx
            .api
            .merge_pull_request(
                ctx.owner,
                ctx.name,
                ctx.number,
                &format!("{} (#{})", state.title, state.number),
                "",
                strategy,
            )
            .await;

        match result {
            Ok(()) => ctx.add_reaction(ReactionType::PlusOne).await?,
            Err(err) => {
                ctx.add_reaction(ReactionType::Confused).await?;
                ctx.respond_to_author(&format!("Error: Could not merge pull request.\n\n{}", err))
                    .await?;
            }
        }

        Ok(CommandOutput { needs_sync: true })
    }
}

/// Parse and execute one comment line, replying inline on parse and domain
/// errors. Platform failures still bubble up.
pub async fn process_command(
    ctx: &Context,
    owner: &str,
    name: &str,
    number: u64,
    author: &str,
    line: &str,
    comment_id: Option<u64>,
) -> Result<CommandOutput> {
    let command_ctx = CommandContext {
        ctx,
        owner,
        name,
        number,
        author,
        comment_id,
        command: Some(line),
    };

    match Command::parse(line, &ctx.config.bot_nickname) {
        Ok(Some(command)) => {
            info!("command detected: {:?}", command);
            match command.execute(&command_ctx).await {
                Ok(output) => Ok(output),
                Err(Error::Domain(err)) => {
                    report_command_error(
                        &command_ctx,
                        &format!("Command execution error: {}", err),
                    )
                    .await?;
                    Ok(CommandOutput { needs_sync: false })
                }
                Err(err) => Err(err),
            }
        }
        Ok(None) => Ok(CommandOutput { needs_sync: false }),
        Err(err) => {
            report_command_error(&command_ctx, &err.to_string()).await?;
            Ok(CommandOutput { needs_sync: false })
        }
    }
}

async fn report_command_error(ctx: &CommandContext<'_>, message: &str) -> Result<()> {
    ctx.add_reaction(ReactionType::Confused).await?;
    ctx.respond_to_author(message).await
}
