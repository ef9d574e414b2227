use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

/// Events produced by the line-reader thread.
#[derive(Debug)]
pub enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
    Error(String),
}

/// Spawn the blocking line editor in a dedicated thread.
/// A prompt is shown each time `ready_rx` receives; the thread exits when it closes.
pub fn spawn(
    prompt: String,
    ready_rx: std::sync::mpsc::Receiver<()>,
) -> mpsc::UnboundedReceiver<InputEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut editor = match rustyline::DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                if tx.send(InputEvent::Error(e.to_string())).is_err() {
                    tracing::warn!(error = %e, "line editor unavailable and console gone");
                }
                return;
            }
        };

        while ready_rx.recv().is_ok() {
            let event = match editor.readline(&prompt) {
                Ok(line) => {
                    if let Err(e) = editor.add_history_entry(line.as_str()) {
                        tracing::debug!(error = %e, "history entry not recorded");
                    }
                    InputEvent::Line(line)
                }
                Err(ReadlineError::Interrupted) => InputEvent::Interrupted,
                Err(ReadlineError::Eof) => InputEvent::Eof,
                Err(e) => InputEvent::Error(e.to_string()),
            };
            let last = !matches!(event, InputEvent::Line(_));
            if tx.send(event).is_err() || last {
                break;
            }
        }
    });
    rx
}
