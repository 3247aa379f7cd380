//! Typed GitHub API surface: models, webhook payloads, and an async client.

pub mod client;

mod auth;
mod events;
mod models;
mod webhook;

pub use auth::{AppAuth, Auth};
pub use client::{Client, ClientBuilder};
pub use events::{
    CheckSuiteAction, CheckSuiteEvent, Event, EventType, IssueCommentAction, IssueCommentEvent,
    ParseEventTypeError, PingEvent, PullRequestAction, PullRequestEvent, PullRequestReviewEvent,
    ReviewAction,
};
pub use models::*;
pub use webhook::{Webhook, DELIVERY_ID_HEADER, EVENT_TYPE_HEADER, SIGNATURE_HEADER};
