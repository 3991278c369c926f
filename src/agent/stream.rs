//! Pull-based streaming of a turn's final answer.
//!
//! [`AnswerStream`] advances one step per [`next`](AnswerStream::next) call.
//! The first pull records the user message and makes a batch probe call; tool
//! calls are dispatched before anything is yielded. The answer itself is
//! then streamed delta by delta. Every message is persisted before the pull
//! that depends on it returns, and the assembled answer is persisted only
//! when the stream is exhausted, so dropping the stream early leaves a
//! consistent history without a final assistant message.

use std::mem;

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;
use crate::providers::StreamEvent;

use super::observer::AgentEvent;
use super::r#loop::AgentLoop;

enum State {
    /// Not pulled yet
    Start(String),
    /// Next pull opens a streaming call
    OpenStream { nudged: bool },
    /// Forwarding deltas of an open streaming call
    Streaming {
        rx: mpsc::Receiver<StreamEvent>,
        buffer: String,
        nudged: bool,
    },
    Finished,
}

/// Incremental answer for one turn, borrowed from its [`AgentLoop`].
pub struct AnswerStream<'a> {
    agent: &'a mut AgentLoop,
    state: State,
}

impl<'a> AnswerStream<'a> {
    pub(super) fn new(agent: &'a mut AgentLoop, text: String) -> Self {
        Self {
            agent,
            state: State::Start(text),
        }
    }

    /// Pull the next piece of the answer.
    ///
    /// Returns `None` once the turn is complete. An error ends the sequence.
    pub async fn next(&mut self) -> Option<Result<String>> {
        loop {
            match mem::replace(&mut self.state, State::Finished) {
                State::Finished => return None,

                State::Start(text) => match self.probe(&text).await {
                    Ok(Some(answer)) => return Some(Ok(answer)),
                    Ok(None) => self.state = State::OpenStream { nudged: false },
                    Err(e) => return Some(Err(e)),
                },

                State::OpenStream { nudged } => match self.agent.open_stream().await {
                    Ok(rx) => {
                        self.state = State::Streaming {
                            rx,
                            buffer: String::new(),
                            nudged,
                        }
                    }
                    Err(e) => return Some(Err(e)),
                },

                State::Streaming {
                    mut rx,
                    mut buffer,
                    nudged,
                } => match rx.recv().await {
                    Some(StreamEvent::Delta(delta)) => {
                        let forward = !delta.is_empty();
                        if forward {
                            buffer.push_str(&delta);
                            self.agent.emit(AgentEvent::AssistantDelta {
                                delta: delta.clone(),
                            });
                        }
                        self.state = State::Streaming { rx, buffer, nudged };
                        if forward {
                            return Some(Ok(delta));
                        }
                    }
                    Some(StreamEvent::Error(e)) => return Some(Err(e)),
                    Some(StreamEvent::Done { .. }) | None => {
                        if buffer.trim().is_empty() && !nudged {
                            return match self.start_nudge().await {
                                Ok(prefix) => Some(Ok(prefix)),
                                Err(e) => Some(Err(e)),
                            };
                        }
                        return match self.finish(buffer, nudged).await {
                            Ok(()) => None,
                            Err(e) => Some(Err(e)),
                        };
                    }
                },
            }
        }
    }

    /// Adapt into a [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<String>> + 'a {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|item| (item, stream))
        })
    }

    /// Batch call made before streaming. Returns the answer when the model
    /// answered directly, `None` when the answer still has to be streamed.
    async fn probe(&mut self, text: &str) -> Result<Option<String>> {
        self.agent.begin_turn(text).await?;
        let response = self.agent.call_model().await?;
        let (content, calls) = AgentLoop::split_response(response);

        if !calls.is_empty() {
            if !content.trim().is_empty() {
                self.agent.record_assistant(&content).await?;
            }
            self.agent.dispatch(calls).await?;
            return Ok(None);
        }

        if content.trim().is_empty() {
            debug!("Empty probe response, streaming the answer");
            return Ok(None);
        }

        self.agent.record_assistant(&content).await?;
        self.agent.end_turn();
        Ok(Some(content))
    }

    async fn start_nudge(&mut self) -> Result<String> {
        self.agent.push_nudge().await?;
        let prefix = self.agent.nudge_prefix().to_string();
        self.agent.emit(AgentEvent::AssistantDelta {
            delta: prefix.clone(),
        });
        self.state = State::OpenStream { nudged: true };
        Ok(prefix)
    }

    async fn finish(&mut self, buffer: String, nudged: bool) -> Result<()> {
        if !buffer.trim().is_empty() {
            let content = if nudged {
                format!("{}{}", self.agent.nudge_prefix(), buffer)
            } else {
                buffer
            };
            self.agent.persist_assistant(&content).await?;
        }
        self.agent.end_turn();
        Ok(())
    }
}
