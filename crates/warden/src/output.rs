use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Mutex;

pub const MAX_LOG_LINES: usize = 300;

/// Returned by [`LogBuffer::text`] while nothing has been captured.
pub const NO_OUTPUT_PLACEHOLDER: &str = "Server is starting or not running yet...";

/// Bounded FIFO of output lines shared between the output pump and readers.
///
/// Clones share the same storage. The lock is only held for a single
/// append, clear, or snapshot.
#[derive(Clone, Debug)]
pub struct LogBuffer {
	lines: Arc<Mutex<VecDeque<String>>>,
	capacity: usize,
}

impl Default for LogBuffer {
	fn default() -> Self {
		Self::new(MAX_LOG_LINES)
	}
}

impl LogBuffer {
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		Self {
			lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
			capacity,
		}
	}

	pub async fn push(&self, line: impl Into<String>) {
		let mut lines = self.lines.lock().await;
		if lines.len() >= self.capacity {
			lines.pop_front();
		}
		lines.push_back(line.into());
	}

	pub async fn clear(&self) {
		self.lines.lock().await.clear();
	}

	pub async fn is_empty(&self) -> bool {
		self.lines.lock().await.is_empty()
	}

	/// Copy of the current contents, oldest first.
	pub async fn snapshot(&self) -> Vec<String> {
		let lines = self.lines.lock().await;
		lines.iter().cloned().collect()
	}

	pub async fn text(&self) -> String {
		render_text(&self.snapshot().await)
	}
}

/// Newline-joined export of `lines`, or the placeholder when there are none.
pub fn render_text(lines: &[String]) -> String {
	if lines.is_empty() {
		NO_OUTPUT_PLACEHOLDER.to_string()
	} else {
		lines.join("\n")
	}
}

/// Line reader that tolerates invalid UTF-8 and keeps partial reads across
/// cancellation, so it can sit in a `select!`.
struct LineReader<R> {
	reader: BufReader<R>,
	buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
	fn new(reader: R) -> Self {
		Self {
			reader: BufReader::new(reader),
			buf: Vec::new(),
		}
	}

	async fn next_line(&mut self) -> Option<String> {
		match self.reader.read_until(b'\n', &mut self.buf).await {
			Ok(0) if self.buf.is_empty() => None,
			Ok(_) => {
				let line = String::from_utf8_lossy(&self.buf).trim_end().to_string();
				self.buf.clear();
				Some(line)
			}
			Err(e) => {
				tracing::debug!("output stream closed: {}", e);
				None
			}
		}
	}
}

async fn next_from<R: AsyncRead + Unpin>(slot: &mut Option<LineReader<R>>) -> Option<String> {
	let Some(reader) = slot.as_mut() else {
		return std::future::pending().await;
	};
	let line = reader.next_line().await;
	if line.is_none() {
		*slot = None;
	}
	line
}

/// Drains stdout and stderr of one process into `buffer` until both streams close.
///
/// The two pipes are merged into a single line stream in the order the reads
/// complete. Lines from one pipe keep their order; lines written to stdout and
/// stderr at nearly the same moment may interleave differently than the
/// process emitted them.
pub async fn pump_output<O, E>(stdout: Option<O>, stderr: Option<E>, buffer: LogBuffer)
where
	O: AsyncRead + Unpin,
	E: AsyncRead + Unpin,
{
	let mut out = stdout.map(LineReader::new);
	let mut err = stderr.map(LineReader::new);

	while out.is_some() || err.is_some() {
		let line = tokio::select! {
			line = next_from(&mut out) => line,
			line = next_from(&mut err) => line,
		};
		if let Some(line) = line {
			buffer.push(line).await;
		}
	}
}
