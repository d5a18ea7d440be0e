use std::sync::mpsc;
use std::thread;

use tungstenite::Message;

/// One event from the live log websocket. Closure and failure are
/// terminal for the log view only; they carry no meaning for scan
/// progress tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Line(String),
    Closed,
    Failed(String),
}

/// Read-only live log stream for one scan, running on a reader thread.
/// Dropping the handle detaches the reader; a send into the closed
/// channel ends it.
pub struct LogStream {
    rx: mpsc::Receiver<StreamEvent>,
}

impl LogStream {
    pub fn connect(url: &str) -> Self {
        let (tx, rx) = mpsc::channel();
        let url = url.to_string();
        thread::spawn(move || read_loop(&url, &tx));
        Self { rx }
    }

    /// Non-blocking drain of everything received since the last call.
    pub fn drain(&self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    events.push(StreamEvent::Closed);
                    break;
                }
            }
        }
        events
    }
}

fn read_loop(url: &str, tx: &mpsc::Sender<StreamEvent>) {
    let mut socket = match tungstenite::connect(url) {
        Ok((socket, _response)) => socket,
        Err(err) => {
            let _ = tx.send(StreamEvent::Failed(format!("log stream: {err}")));
            return;
        }
    };

    loop {
        match socket.read() {
            Ok(Message::Text(text)) => {
                for line in text.lines() {
                    if tx.send(StreamEvent::Line(line.to_string())).is_err() {
                        return;
                    }
                }
            }
            Ok(Message::Binary(bytes)) => {
                let text = String::from_utf8_lossy(&bytes);
                for line in text.lines() {
                    if tx.send(StreamEvent::Line(line.to_string())).is_err() {
                        return;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                let _ = tx.send(StreamEvent::Closed);
                return;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(err) => {
                let _ = tx.send(StreamEvent::Failed(format!("log stream: {err}")));
                return;
            }
        }
    }
}
