use std::{
    fmt,
    io::{self, Read},
    sync::Mutex,
    thread,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        })
    }
}

/// Receives subprocess output one line at a time, without the trailing newline.
///
/// Called concurrently from the stdout and stderr reader threads.
pub trait LineConsumer: Send + Sync {
    fn accept(&self, stream: OutputStream, line: &str);
}

impl<F> LineConsumer for F
where
    F: Fn(OutputStream, &str) + Send + Sync,
{
    fn accept(&self, stream: OutputStream, line: &str) {
        self(stream, line)
    }
}

/// Collects every line it receives; mostly useful in tests.
#[derive(Debug, Default)]
pub struct RecordingConsumer {
    lines: Mutex<Vec<(OutputStream, String)>>,
}

impl RecordingConsumer {
    pub fn lines(&self) -> Vec<(OutputStream, String)> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl LineConsumer for RecordingConsumer {
    fn accept(&self, stream: OutputStream, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((stream, line.to_string()));
        }
    }
}

/// Drain `reader`, forwarding complete lines to `consumer` and retaining at most `max_bytes`.
pub(crate) fn pump(
    mut reader: impl Read,
    stream: OutputStream,
    max_bytes: usize,
    consumer: Option<&dyn LineConsumer>,
) -> io::Result<(String, bool)> {
    let mut retained = Vec::new();
    let mut truncated = false;
    let mut pending = Vec::new();
    let mut buf = [0u8; 8 * 1024];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        let chunk = &buf[..n];

        let keep = max_bytes.saturating_sub(retained.len()).min(n);
        retained.extend_from_slice(&chunk[..keep]);
        truncated |= keep < n;

        if let Some(consumer) = consumer {
            pending.extend_from_slice(chunk);
            let mut start = 0;
            while let Some(pos) = pending[start..].iter().position(|b| *b == b'\n') {
                emit(consumer, stream, &pending[start..start + pos]);
                start += pos + 1;
            }
            pending.drain(..start);
            // A single unterminated line may not grow without bound.
            if pending.len() > max_bytes.max(64 * 1024) {
                emit(consumer, stream, &pending);
                pending.clear();
            }
        }
    }

    if let Some(consumer) = consumer {
        if !pending.is_empty() {
            emit(consumer, stream, &pending);
        }
    }

    Ok((String::from_utf8_lossy(&retained).into_owned(), truncated))
}

fn emit(consumer: &dyn LineConsumer, stream: OutputStream, line: &[u8]) {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    consumer.accept(stream, &String::from_utf8_lossy(line));
}

pub(crate) fn join(
    handle: thread::JoinHandle<io::Result<(String, bool)>>,
    stream: OutputStream,
) -> io::Result<(String, bool)> {
    handle
        .join()
        .map_err(|_| io::Error::other(format!("{stream} reader thread panicked")))?
}
