//! The read-eval-print loop between the user and the agent.

pub mod input;

use anyhow::{Context, Result};
use std::io::Write;
use tokio_util::sync::CancellationToken;

use crate::agent::ConversationAgent;
use crate::types::ConversationState;

pub use input::{LineInput, LineReader, LineSource, ReadOutcome, ReedlineSource, StdinSource};

pub const PROMPT: &str = "tw-client> ";
pub const FAREWELL: &str = "👋 Goodbye!";
pub const NO_RESPONSE: &str = "No response received.";

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    ExitCommand,
    EndOfInput,
    Interrupted,
}

fn is_exit_command(line: &str) -> bool {
    line.to_lowercase() == "exit"
}

/// Read a line, send it to the agent as a fresh one-message conversation,
/// print the last assistant message, repeat.
///
/// Agent failures are returned as errors and end the loop. Cancelling
/// `cancel` stops the loop at once, also while a read or an agent call is
/// pending.
pub async fn run_loop<I, A, W>(
    input: &mut I,
    agent: &A,
    out: &mut W,
    cancel: &CancellationToken,
) -> Result<LoopExit>
where
    I: LineInput + ?Sized,
    A: ConversationAgent + ?Sized,
    W: Write,
{
    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => ReadOutcome::Interrupted,
            outcome = input.next_line() => outcome.context("failed to read input")?,
        };

        let line = match outcome {
            ReadOutcome::Line(line) => line,
            ReadOutcome::Eof => {
                writeln!(out, "\n{}", FAREWELL)?;
                return Ok(LoopExit::EndOfInput);
            }
            ReadOutcome::Interrupted => {
                writeln!(out, "{}", FAREWELL)?;
                return Ok(LoopExit::Interrupted);
            }
        };

        if line.is_empty() {
            continue;
        }

        if is_exit_command(&line) {
            writeln!(out, "{}", FAREWELL)?;
            return Ok(LoopExit::ExitCommand);
        }

        tracing::debug!(chars = line.len(), "invoking agent");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                writeln!(out, "\n{}", FAREWELL)?;
                return Ok(LoopExit::Interrupted);
            }
            response = agent.invoke(ConversationState::from_human(line)) => {
                response.context("agent invocation failed")?
            }
        };

        writeln!(out, "{}", response.last_assistant_text().unwrap_or(NO_RESPONSE))?;
        out.flush()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, LlmError};
    use crate::types::{Message, Role, ToolCall};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;

    struct Script(VecDeque<ReadOutcome>);

    impl Script {
        fn lines(lines: &[&str]) -> Self {
            Script(lines.iter().map(|l| ReadOutcome::Line(l.to_string())).collect())
        }
    }

    #[async_trait]
    impl LineInput for Script {
        async fn next_line(&mut self) -> io::Result<ReadOutcome> {
            Ok(self.0.pop_front().unwrap_or(ReadOutcome::Eof))
        }
    }

    /// Records every state it receives and answers from a queue.
    #[derive(Default)]
    struct FakeAgent {
        calls: Mutex<Vec<ConversationState>>,
        responses: Mutex<VecDeque<Result<ConversationState, AgentError>>>,
    }

    impl FakeAgent {
        fn answering(responses: Vec<Result<ConversationState, AgentError>>) -> Self {
            FakeAgent {
                calls: Mutex::new(Vec::new()),
                responses: Mutex::new(responses.into()),
            }
        }

        fn calls(&self) -> Vec<ConversationState> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConversationAgent for FakeAgent {
        async fn invoke(&self, state: ConversationState) -> Result<ConversationState, AgentError> {
            self.calls.lock().unwrap().push(state);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ConversationState::new()))
        }
    }

    /// Never finishes; used to cancel mid-call.
    struct Stuck;

    #[async_trait]
    impl ConversationAgent for Stuck {
        async fn invoke(&self, _: ConversationState) -> Result<ConversationState, AgentError> {
            std::future::pending().await
        }
    }

    fn reply(messages: Vec<Message>) -> Result<ConversationState, AgentError> {
        Ok(ConversationState { messages })
    }

    async fn run(input: &mut dyn LineInput, agent: &dyn ConversationAgent) -> (Result<LoopExit>, String) {
        let mut out = Vec::new();
        let result = run_loop(input, agent, &mut out, &CancellationToken::new()).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn each_line_becomes_one_human_message() {
        let agent = FakeAgent::answering(vec![
            reply(vec![Message::assistant("hi there", vec![])]),
            reply(vec![Message::assistant("again", vec![])]),
        ]);
        let mut input = Script::lines(&["hello", "second line"]);

        let (result, out) = run(&mut input, &agent).await;
        assert_eq!(result.unwrap(), LoopExit::EndOfInput);
        assert_eq!(out, "hi there\nagain\n\n👋 Goodbye!\n");

        let calls = agent.calls();
        assert_eq!(calls.len(), 2);
        for (call, text) in calls.iter().zip(["hello", "second line"]) {
            assert_eq!(call.messages.len(), 1);
            assert_eq!(call.messages[0].role, Role::Human);
            assert_eq!(call.messages[0].content, text);
        }
    }

    #[tokio::test]
    async fn prints_last_assistant_message_skipping_later_roles() {
        let call = ToolCall {
            id: "1".to_string(),
            name: "t".to_string(),
            arguments: json!({}),
        };
        let agent = FakeAgent::answering(vec![reply(vec![
            Message::human("q"),
            Message::assistant("early", vec![]),
            Message::assistant("late", vec![]),
            Message::tool_result(&call, "tool output"),
        ])]);
        let mut input = Script::lines(&["q"]);

        let (_, out) = run(&mut input, &agent).await;
        assert!(out.starts_with("late\n"));
    }

    #[tokio::test]
    async fn empty_response_prints_fallback_and_continues() {
        let agent = FakeAgent::answering(vec![
            reply(vec![]),
            reply(vec![Message::human("only human")]),
            reply(vec![Message::assistant("back", vec![])]),
        ]);
        let mut input = Script::lines(&["a", "b", "c"]);

        let (result, out) = run(&mut input, &agent).await;
        assert_eq!(result.unwrap(), LoopExit::EndOfInput);
        assert_eq!(
            out,
            "No response received.\nNo response received.\nback\n\n👋 Goodbye!\n"
        );
    }

    #[tokio::test]
    async fn exit_in_any_case_stops_without_invoking() {
        for word in ["exit", "Exit", "EXIT"] {
            let agent = FakeAgent::default();
            let mut input = Script::lines(&[word, "never read"]);

            let (result, out) = run(&mut input, &agent).await;
            assert_eq!(result.unwrap(), LoopExit::ExitCommand);
            assert_eq!(out, "👋 Goodbye!\n");
            assert!(agent.calls().is_empty());
            assert_eq!(input.0.len(), 1);
        }
    }

    #[tokio::test]
    async fn exit_with_surrounding_text_is_forwarded() {
        let agent = FakeAgent::default();
        let mut input = Script::lines(&["exit now"]);

        run(&mut input, &agent).await.0.unwrap();
        assert_eq!(agent.calls().len(), 1);
    }

    #[tokio::test]
    async fn end_of_input_says_goodbye() {
        let agent = FakeAgent::default();
        let mut input = Script(VecDeque::new());

        let (result, out) = run(&mut input, &agent).await;
        assert_eq!(result.unwrap(), LoopExit::EndOfInput);
        assert_eq!(out, "\n👋 Goodbye!\n");
    }

    #[tokio::test]
    async fn empty_lines_are_skipped() {
        let agent = FakeAgent::default();
        let mut input = Script::lines(&["", "", "real"]);

        run(&mut input, &agent).await.0.unwrap();
        let calls = agent.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].messages[0].content, "real");
    }

    #[tokio::test]
    async fn whitespace_lines_are_forwarded_verbatim() {
        let agent = FakeAgent::default();
        let mut input = Script::lines(&["   ", " exit "]);

        let (result, _) = run(&mut input, &agent).await;
        assert_eq!(result.unwrap(), LoopExit::EndOfInput);

        let calls = agent.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].messages.len(), 1);
        assert_eq!(calls[0].messages[0].content, "   ");
        assert_eq!(calls[1].messages[0].content, " exit ");
    }

    #[tokio::test]
    async fn agent_errors_end_the_loop() {
        let agent = FakeAgent::answering(vec![Err(AgentError::Llm(LlmError::Parse(
            "bad".to_string(),
        )))]);
        let mut input = Script::lines(&["boom", "unreached"]);

        let (result, out) = run(&mut input, &agent).await;
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("agent invocation failed"));
        assert!(out.is_empty());
        assert_eq!(input.0.len(), 1);
    }

    #[tokio::test]
    async fn interrupted_read_says_goodbye() {
        let agent = FakeAgent::default();
        let mut input = Script(vec![ReadOutcome::Interrupted].into());

        let (result, out) = run(&mut input, &agent).await;
        assert_eq!(result.unwrap(), LoopExit::Interrupted);
        assert_eq!(out, "👋 Goodbye!\n");
    }

    #[tokio::test]
    async fn cancellation_aborts_a_pending_agent_call() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut input = Script::lines(&["slow question"]);
        let mut out = Vec::new();
        let exit = run_loop(&mut input, &Stuck, &mut out, &cancel).await.unwrap();

        assert_eq!(exit, LoopExit::Interrupted);
        assert_eq!(String::from_utf8(out).unwrap(), "\n👋 Goodbye!\n");
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_reading() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let agent = FakeAgent::default();
        let mut input = Script::lines(&["hello"]);
        let mut out = Vec::new();

        let exit = run_loop(&mut input, &agent, &mut out, &cancel).await.unwrap();
        assert_eq!(exit, LoopExit::Interrupted);
        assert_eq!(input.0.len(), 1);
        assert!(agent.calls().is_empty());
    }
}
