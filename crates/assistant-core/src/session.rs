//! One chat session: the transcript plus the single in-flight request
//!
//! A send pushes the user message right away and spawns the backend call. Only
//! one request may be outstanding; further sends are ignored until its reply
//! (or failure) has been appended. There are no retries and no cancellation.

use crate::attachment::Attachment;
use crate::backend::BackendClient;
use crate::state::{MessageId, Transcript};
use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shown in place of a reply when the request fails for any reason
pub const FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// What the user has composed but not sent yet
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub prompt: String,
    pub attachment: Option<Attachment>,
}

impl Draft {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachment: None,
        }
    }

    pub fn document(attachment: Attachment) -> Self {
        Self {
            prompt: String::new(),
            attachment: Some(attachment),
        }
    }

    /// Nothing to send: blank prompt and no attachment
    pub fn is_empty(&self) -> bool {
        self.prompt.trim().is_empty() && self.attachment.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The user message was appended and a request started
    Sent(MessageId),
    /// A request is already in flight; nothing happened
    Busy,
    /// The draft was empty; nothing happened
    Empty,
}

pub struct ChatSession {
    transcript: Transcript,
    client: BackendClient,
    in_flight: Option<JoinHandle<Result<String>>>,
}

impl ChatSession {
    pub fn new(client: BackendClient) -> Self {
        Self {
            transcript: Transcript::new(),
            client,
            in_flight: None,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start a request for `draft`. Must be called inside a tokio runtime.
    ///
    /// With an attachment the document goes to `/summarize` and the prompt is
    /// only recorded in the transcript; otherwise the prompt goes to `/ask`.
    pub fn send(&mut self, draft: Draft) -> SendOutcome {
        if self.is_loading() {
            debug!("send ignored: request already in flight");
            return SendOutcome::Busy;
        }
        if draft.is_empty() {
            return SendOutcome::Empty;
        }

        let prompt = draft.prompt.trim().to_string();
        let attachment_name = draft.attachment.as_ref().map(|a| a.name().to_string());
        let id = self.transcript.push_user(prompt.clone(), attachment_name);

        let client = self.client.clone();
        let task = match draft.attachment {
            Some(attachment) => {
                info!(file = attachment.name(), bytes = attachment.size(), "summarizing document");
                tokio::spawn(async move { client.summarize(&attachment).await })
            }
            None => {
                info!(chars = prompt.chars().count(), "asking backend");
                tokio::spawn(async move { client.ask(&prompt).await })
            }
        };
        self.in_flight = Some(task);

        SendOutcome::Sent(id)
    }

    /// Append the reply if the in-flight request has finished. Never blocks.
    pub async fn poll_response(&mut self) -> Option<MessageId> {
        let finished = self
            .in_flight
            .as_ref()
            .is_some_and(|task| task.is_finished());
        if !finished {
            return None;
        }
        self.wait_for_response().await
    }

    /// Wait for the in-flight request and append its reply or failure.
    pub async fn wait_for_response(&mut self) -> Option<MessageId> {
        let task = self.in_flight.take()?;

        let id = match task.await {
            Ok(Ok(reply)) => {
                debug!(chars = reply.chars().count(), "reply received");
                self.transcript.push_assistant(reply)
            }
            Ok(Err(err)) => {
                warn!(error = %err, "backend request failed");
                self.transcript.push_error(FAILURE_MESSAGE)
            }
            Err(err) => {
                warn!(error = %err, "backend request task did not complete");
                self.transcript.push_error(FAILURE_MESSAGE)
            }
        };

        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::render;
    use crate::state::ChatRole;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_empty_draft_is_noop() {
        let mut session = ChatSession::new(BackendClient::new("http://127.0.0.1:9"));
        assert_eq!(session.send(Draft::text("   \n")), SendOutcome::Empty);
        assert!(session.transcript().is_empty());
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_ask_round_trip_renders_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "response": "## Hi\n\nThis is *great*." })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut session = ChatSession::new(BackendClient::new(&server.uri()));
        assert!(matches!(session.send(Draft::text("**Hello** world")), SendOutcome::Sent(_)));
        assert!(session.is_loading());

        let reply_id = session.wait_for_response().await.expect("reply appended");
        assert!(!session.is_loading());

        let messages = session.transcript().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role(), ChatRole::User);
        assert_eq!(messages[0].raw_text(), "**Hello** world");

        let reply = session.transcript().get(reply_id).unwrap();
        assert_eq!(reply.role(), ChatRole::Assistant);
        assert!(!reply.is_error());

        let html = render(reply.raw_text());
        let heading = html.find("<h2>Hi</h2>").expect("h2 heading");
        let italic = html.find("<p>This is <em>great</em>.</p>").expect("paragraph with italic");
        assert!(heading < italic);
    }

    #[tokio::test]
    async fn test_second_send_while_in_flight_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": "done" }))
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut session = ChatSession::new(BackendClient::new(&server.uri()));
        assert!(matches!(session.send(Draft::text("first")), SendOutcome::Sent(_)));
        assert_eq!(session.send(Draft::text("second")), SendOutcome::Busy);
        assert_eq!(session.transcript().len(), 1);

        // still in flight: polling appends nothing
        assert_eq!(session.poll_response().await, None);

        session.wait_for_response().await;
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.transcript().last().unwrap().raw_text(), "done");
    }

    #[tokio::test]
    async fn test_failure_appends_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut session = ChatSession::new(BackendClient::new(&server.uri()));
        session.send(Draft::text("hello"));
        session.wait_for_response().await;

        let last = session.transcript().last().unwrap();
        assert!(last.is_error());
        assert_eq!(last.role(), ChatRole::Assistant);
        assert_eq!(last.raw_text(), FAILURE_MESSAGE);

        // the session stays usable after a failure
        assert!(matches!(session.send(Draft::text("again")), SendOutcome::Sent(_)));
    }

    async fn assert_failed_then_usable(session: &mut ChatSession) {
        session.wait_for_response().await;

        let last = session.transcript().last().unwrap();
        assert_eq!(last.role(), ChatRole::Assistant);
        assert!(last.is_error());
        assert_eq!(last.raw_text(), FAILURE_MESSAGE);
        assert!(!session.is_loading());
        assert!(matches!(session.send(Draft::text("again")), SendOutcome::Sent(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_appends_error_message() {
        // Bind then release a port so nothing is listening on it
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let mut session = ChatSession::new(BackendClient::new(&format!("http://127.0.0.1:{port}")));
        session.send(Draft::text("hello"));
        assert_failed_then_usable(&mut session).await;
    }

    #[tokio::test]
    async fn test_non_json_body_appends_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let mut session = ChatSession::new(BackendClient::new(&server.uri()));
        session.send(Draft::text("hello"));
        assert_failed_then_usable(&mut session).await;
    }

    #[tokio::test]
    async fn test_attachment_goes_to_summarize() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/summarize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "summary": "It says hi." })))
            .expect(1)
            .mount(&server)
            .await;

        let attachment = Attachment::new("hello.txt", b"hi".to_vec()).unwrap();
        let mut session = ChatSession::new(BackendClient::new(&server.uri()));
        session.send(Draft::document(attachment));
        session.wait_for_response().await;

        let messages = session.transcript().messages();
        assert_eq!(messages[0].attachment_name(), Some("hello.txt"));
        assert_eq!(messages[0].raw_text(), "");
        assert_eq!(messages[1].raw_text(), "It says hi.");
    }

    #[tokio::test]
    async fn test_poll_picks_up_finished_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "ok" })))
            .mount(&server)
            .await;

        let mut session = ChatSession::new(BackendClient::new(&server.uri()));
        session.send(Draft::text("ping"));

        let mut appended = None;
        for _ in 0..100 {
            appended = session.poll_response().await;
            if appended.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(appended.is_some());
        assert!(!session.is_loading());
    }
}
