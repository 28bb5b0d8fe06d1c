use async_trait::async_trait;
use reedline::{
    DefaultCompleter, DefaultHinter, Prompt, PromptEditMode, PromptHistorySearch, Reedline,
    Signal,
};
use std::borrow::Cow;
use std::io::{self, BufRead, Write};
use std::sync::mpsc as std_mpsc;
use tokio::sync::mpsc;

/// What one attempt to read a line produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    Eof,
    Interrupted,
}

/// Async source of user lines, consumed by the interactive loop.
#[async_trait]
pub trait LineInput: Send {
    async fn next_line(&mut self) -> io::Result<ReadOutcome>;
}

/// Blocking line source. Prints its own prompt.
pub trait LineSource {
    fn read_line(&mut self) -> io::Result<ReadOutcome>;
}

/// Fixed prompt rendered by reedline.
pub struct ClientPrompt {
    text: String,
}

impl ClientPrompt {
    pub fn new(text: impl Into<String>) -> Self {
        ClientPrompt { text: text.into() }
    }
}

impl Prompt for ClientPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.text)
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _edit_mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(&self, search: PromptHistorySearch) -> Cow<'_, str> {
        Cow::Owned(format!("(search: {}) ", search.term))
    }
}

/// Line editor for interactive terminals: history, hints, Ctrl-C/Ctrl-D.
pub struct ReedlineSource {
    editor: Reedline,
    prompt: ClientPrompt,
}

impl ReedlineSource {
    pub fn new(prompt: &str) -> Self {
        let completer = DefaultCompleter::new_with_wordlen(vec!["exit".to_string()], 2);
        let hinter = DefaultHinter::default();

        let editor = Reedline::create()
            .with_hinter(Box::new(hinter))
            .with_completer(Box::new(completer));

        ReedlineSource {
            editor,
            prompt: ClientPrompt::new(prompt),
        }
    }
}

impl LineSource for ReedlineSource {
    fn read_line(&mut self) -> io::Result<ReadOutcome> {
        #[allow(unreachable_patterns)]
        match self.editor.read_line(&self.prompt)? {
            Signal::Success(buffer) => Ok(ReadOutcome::Line(buffer)),
            Signal::CtrlD => Ok(ReadOutcome::Eof),
            Signal::CtrlC => Ok(ReadOutcome::Interrupted),
            _ => Ok(ReadOutcome::Interrupted),
        }
    }
}

/// Plain buffered reader for pipes and redirected input.
pub struct StdinSource<R, W> {
    reader: R,
    prompt_out: W,
    prompt: String,
}

impl<R: BufRead, W: Write> StdinSource<R, W> {
    pub fn new(reader: R, prompt_out: W, prompt: &str) -> Self {
        StdinSource {
            reader,
            prompt_out,
            prompt: prompt.to_string(),
        }
    }
}

impl<R: BufRead, W: Write> LineSource for StdinSource<R, W> {
    fn read_line(&mut self) -> io::Result<ReadOutcome> {
        write!(self.prompt_out, "{}", self.prompt)?;
        self.prompt_out.flush()?;

        let mut buf = String::new();
        if self.reader.read_line(&mut buf)? == 0 {
            return Ok(ReadOutcome::Eof);
        }
        if buf.ends_with('\n') {
            buf.pop();
            if buf.ends_with('\r') {
                buf.pop();
            }
        }
        Ok(ReadOutcome::Line(buf))
    }
}

/// Runs a blocking [`LineSource`] on its own thread and reads one line per
/// request, so a prompt only appears when the loop asks for input.
pub struct LineReader {
    requests: std_mpsc::Sender<()>,
    lines: mpsc::Receiver<io::Result<ReadOutcome>>,
}

impl LineReader {
    /// The source is built on the reader thread, so it need not be `Send`.
    pub fn spawn<F, S>(make_source: F) -> io::Result<Self>
    where
        F: FnOnce() -> io::Result<S> + Send + 'static,
        S: LineSource,
    {
        let (request_tx, request_rx) = std_mpsc::channel::<()>();
        let (line_tx, line_rx) = mpsc::channel(1);

        std::thread::Builder::new()
            .name("line-reader".to_string())
            .spawn(move || {
                let mut source = make_source();
                while request_rx.recv().is_ok() {
                    let outcome = match source.as_mut() {
                        Ok(source) => source.read_line(),
                        Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
                    };
                    let last = matches!(outcome, Ok(ReadOutcome::Eof) | Err(_));
                    if line_tx.blocking_send(outcome).is_err() || last {
                        break;
                    }
                }
            })?;

        Ok(LineReader {
            requests: request_tx,
            lines: line_rx,
        })
    }
}

#[async_trait]
impl LineInput for LineReader {
    async fn next_line(&mut self) -> io::Result<ReadOutcome> {
        if self.requests.send(()).is_err() {
            return Ok(ReadOutcome::Eof);
        }
        match self.lines.recv().await {
            Some(outcome) => outcome,
            None => Ok(ReadOutcome::Eof),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn stdin_source_prints_prompt_and_strips_line_endings() {
        let mut prompt_out = Vec::new();
        let mut source = StdinSource::new(Cursor::new("hello\r\nworld"), &mut prompt_out, "tw-client> ");

        assert_eq!(source.read_line().unwrap(), ReadOutcome::Line("hello".to_string()));
        assert_eq!(source.read_line().unwrap(), ReadOutcome::Line("world".to_string()));
        assert_eq!(source.read_line().unwrap(), ReadOutcome::Eof);
        drop(source);
        assert_eq!(String::from_utf8(prompt_out).unwrap(), "tw-client> ".repeat(3));
    }

    #[tokio::test]
    async fn reader_thread_serves_lines_then_eof() {
        let mut reader = LineReader::spawn(|| {
            Ok(StdinSource::new(Cursor::new("one\ntwo\n"), io::sink(), "> "))
        })
        .unwrap();

        assert_eq!(reader.next_line().await.unwrap(), ReadOutcome::Line("one".to_string()));
        assert_eq!(reader.next_line().await.unwrap(), ReadOutcome::Line("two".to_string()));
        assert_eq!(reader.next_line().await.unwrap(), ReadOutcome::Eof);
        assert_eq!(reader.next_line().await.unwrap(), ReadOutcome::Eof);
    }

    #[tokio::test]
    async fn source_construction_errors_surface_on_read() {
        let mut reader = LineReader::spawn(|| {
            Err::<StdinSource<Cursor<&[u8]>, io::Sink>, _>(io::Error::new(
                io::ErrorKind::Other,
                "no terminal",
            ))
        })
        .unwrap();

        let err = reader.next_line().await.unwrap_err();
        assert_eq!(err.to_string(), "no terminal");
    }
}
