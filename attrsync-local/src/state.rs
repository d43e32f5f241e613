//! The state file: a stream of pretty-printed JSON events, each carrying an
//! RFC 6902 patch. Event 0 creates the document; every later event is the diff
//! produced by one write.

use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use serde_json::{de::IoRead, Deserializer, StreamDeserializer, Value};
use std::{
    fs::{File, OpenOptions},
    io::{self, BufReader, Seek as _, SeekFrom, Write},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Event {
    pub index: u64,
    pub meta: EventMeta,
    pub patch: json_patch::Patch,
}

/// When an event was written, plus whatever the writer wants to record, such
/// as the `action` that caused it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct EventMeta {
    pub time: String,
    #[serde(flatten)]
    pub extra: Value,
}

impl EventMeta {
    pub fn now(extra: Value) -> Self {
        EventMeta {
            time: Utc::now().to_rfc3339(),
            extra,
        }
    }
}

impl Event {
    /// The event that creates `document` from nothing.
    fn genesis(document: Value) -> Event {
        Event {
            index: 0,
            meta: EventMeta::now(serde_json::json!({})),
            patch: json_patch::Patch(vec![json_patch::PatchOperation::Add(
                json_patch::AddOperation {
                    path: Default::default(),
                    value: document,
                },
            )]),
        }
    }
}

/// The events of a state file, in order. Construction fails unless the input
/// starts with a well-formed event 0.
pub struct Events<'a, R: io::Read> {
    genesis: Option<Event>,
    rest: StreamDeserializer<'a, IoRead<R>, Event>,
}

impl<'a, R: io::Read> Events<'a, R> {
    pub fn from_reader(reader: R) -> Result<Events<'a, R>> {
        let mut rest = Deserializer::from_reader(reader).into_iter::<Event>();
        let genesis = match rest.next() {
            None => bail!("State file invalid: no initial state event"),
            Some(Err(e)) => bail!("State file invalid: error parsing initial state event: {}", e),
            Some(Ok(event)) if event.index != 0 => {
                bail!("Expected initial state event with index 0, got {}", event.index)
            }
            Some(Ok(event)) => event,
        };
        Ok(Events {
            genesis: Some(genesis),
            rest,
        })
    }
}

impl<R: io::Read> Iterator for Events<'_, R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.genesis.take() {
            Some(event) => Some(Ok(event)),
            None => self.rest.next().map(|r| r.map_err(Into::into)),
        }
    }
}

/// Replays `events` onto an empty document. Returns the document and the index
/// of the last event.
pub fn fold(events: impl Iterator<Item = Result<Event>>) -> Result<(Value, u64)> {
    let mut document = serde_json::json!({});
    let mut last = 0;
    for event in events {
        let event = event?;
        if event.index != 0 && event.index <= last {
            warn!(
                index = event.index,
                previous = last,
                "state event index does not increase"
            );
        }
        json_patch::patch(&mut document, &event.patch.0)
            .with_context(|| format!("Could not apply state event {}", event.index))?;
        last = event.index;
    }
    Ok((document, last))
}

/// Reads and folds a state file without locking it.
pub fn read_document<P: AsRef<Path>>(path: P) -> Result<Value> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Could not open state file {}", path.display()))?;
    let (document, _) = fold(Events::from_reader(BufReader::new(file))?)?;
    Ok(document)
}

/// Logs from a background thread while a blocking wait is in progress: once
/// after a short grace period, then periodically with the elapsed time.
pub struct WaitNotice {
    finished: Arc<AtomicBool>,
}

impl WaitNotice {
    const GRACE: Duration = Duration::from_millis(500);
    const REPEAT: Duration = Duration::from_secs(5);

    pub fn start(what: &'static str) -> WaitNotice {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        std::thread::spawn(move || {
            let started = Instant::now();
            let mut next = Self::GRACE;
            loop {
                std::thread::sleep(next.saturating_sub(started.elapsed()));
                if flag.load(Ordering::Relaxed) {
                    return;
                }
                info!(seconds = started.elapsed().as_secs(), "{}", what);
                next += Self::REPEAT;
            }
        });
        WaitNotice { finished }
    }
}

impl Drop for WaitNotice {
    fn drop(&mut self) {
        self.finished.store(true, Ordering::Relaxed);
    }
}

/// An open state file. Appends happen under an exclusive advisory lock.
pub struct StateFile {
    file: Arc<File>,
    lock: fd_lock::RwLock<Arc<File>>,
    /// End of file after our last append; anything beyond it was written by
    /// another process.
    known_len: Option<u64>,
}

impl StateFile {
    /// Opens an existing state file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<StateFile> {
        Self::open_with(path.as_ref(), false)
    }

    /// Creates a state file holding `document`. Fails if the file exists.
    pub fn create<P: AsRef<Path>>(path: P, document: Value) -> Result<StateFile> {
        let mut state = Self::open_with(path.as_ref(), true)?;
        state.append(&Event::genesis(document))?;
        Ok(state)
    }

    fn open_with(path: &Path, create: bool) -> Result<StateFile> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(create)
            .open(path)
            .with_context(|| format!("Could not open state file {}", path.display()))?;
        let file = Arc::new(file);
        Ok(StateFile {
            lock: fd_lock::RwLock::new(file.clone()),
            file,
            known_len: None,
        })
    }

    fn append(&mut self, event: &Event) -> Result<()> {
        let _guard = {
            let _notice = WaitNotice::start("Waiting for state file write lock");
            self.lock.write()?
        };
        warn_on_foreign_appends(&self.file, self.known_len)?;
        self.known_len = Some(write_event(&self.file, event)?);
        Ok(())
    }

    /// Folds the file under the write lock, lets `f` change the document, and
    /// appends the difference as a single event. Nothing is appended when `f`
    /// fails or leaves the document as it was.
    pub fn update<T>(&mut self, extra_meta: Value, f: impl FnOnce(&mut Value) -> Result<T>) -> Result<T> {
        let _guard = {
            let _notice = WaitNotice::start("Waiting for state file write lock");
            self.lock.write()?
        };
        let end = warn_on_foreign_appends(&self.file, self.known_len)?;

        (&*self.file).seek(SeekFrom::Start(0))?;
        let (before, last) = fold(Events::from_reader(BufReader::new(&*self.file))?)?;

        let mut after = before.clone();
        let result = f(&mut after)?;

        let patch = json_patch::diff(&before, &after);
        self.known_len = Some(if patch.0.is_empty() {
            end
        } else {
            let event = Event {
                index: last + 1,
                meta: EventMeta::now(extra_meta),
                patch,
            };
            write_event(&self.file, &event)?
        });
        Ok(result)
    }
}

/// Returns the current end of the file.
fn warn_on_foreign_appends(file: &File, known_len: Option<u64>) -> Result<u64> {
    let end = (&*file).seek(SeekFrom::End(0))?;
    match known_len {
        Some(known) if known != end => warn!(
            from = known,
            to = end,
            "Detected concurrent writing to the state file; foreign events will be folded in"
        ),
        _ => {}
    }
    Ok(end)
}

/// Returns the end of the file after writing.
fn write_event(file: &File, event: &Event) -> Result<u64> {
    let mut writer = io::BufWriter::new(file);
    // Pretty, so that the file stays reviewable by humans.
    serde_json::to_writer_pretty(&mut writer, event)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    drop(writer);
    Ok((&*file).stream_position()?)
}
