//! Disk-chunked k-way merge sort.
//!
//! The input is cut into runs of `sort_chunk_rows` items. Each run is sorted
//! in memory and written to its own file inside a private temporary
//! directory; the runs are then merged through a min-heap. The directory is
//! removed when the sort returns, on success or on error.
//!
//! A run sorts numerically when every key in it parses as an integer and
//! lexicographically otherwise. When runs of both kinds meet in the merge,
//! integer keys order before text keys.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum RunKey {
    Integer(i64),
    Text(String),
}

#[derive(Debug)]
struct Run {
    path: PathBuf,
    numeric: bool,
}

/// Bookkeeping for a single sort invocation.
#[derive(Debug)]
struct RunState {
    source: String,
    runs: Vec<Run>,
    total: usize,
}

pub struct ExternalMergeSort<'a> {
    config: &'a EngineConfig,
}

impl<'a> ExternalMergeSort<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Sorts `keys`, returning them in ascending order.
    pub fn sort(&self, name: &str, keys: Vec<String>) -> EngineResult<Vec<String>> {
        let items = keys.into_iter().enumerate().map(|(i, k)| (k, i)).collect();
        Ok(self
            .sort_pairs(name, items)?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    /// Sorts `(key, payload)` pairs by key. Equal keys keep their input order.
    pub fn sort_pairs(
        &self,
        name: &str,
        items: Vec<(String, usize)>,
    ) -> EngineResult<Vec<(String, usize)>> {
        self.config.validate()?;
        let dir = self.scratch_dir()?;
        let mut state = RunState {
            source: name.to_string(),
            runs: Vec::new(),
            total: 0,
        };

        let chunk_rows = self.config.sort_chunk_rows;
        let mut items = items.into_iter().peekable();
        while items.peek().is_some() {
            let mut chunk: Vec<(String, usize)> = items.by_ref().take(chunk_rows).collect();
            let numeric = sort_run(&mut chunk);
            let path = dir.path().join(format!("run-{}.txt", state.runs.len()));
            write_run(&path, &chunk)?;
            state.total += chunk.len();
            state.runs.push(Run { path, numeric });
        }
        debug!(
            source = %state.source,
            runs = state.runs.len(),
            total = state.total,
            "wrote sort runs"
        );

        let merged = merge_runs(&state)?;
        if merged.len() != state.total {
            return Err(EngineError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "merge of {} produced {} items, expected {}",
                    state.source,
                    merged.len(),
                    state.total
                ),
            )));
        }
        dir.close()?;
        Ok(merged)
    }

    fn scratch_dir(&self) -> EngineResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("minirel-sort-");
        let dir = match &self.config.temp_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

/// Sorts one run in place and reports whether it used integer ordering.
fn sort_run(chunk: &mut [(String, usize)]) -> bool {
    let numeric = chunk.iter().all(|(k, _)| k.parse::<i64>().is_ok());
    if numeric {
        chunk.sort_by_key(|(k, _)| k.parse::<i64>().unwrap_or_default());
    } else {
        chunk.sort_by(|a, b| a.0.cmp(&b.0));
    }
    numeric
}

fn escape(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for ch in key.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn write_run(path: &Path, chunk: &[(String, usize)]) -> EngineResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for (key, payload) in chunk {
        writeln!(writer, "{}\t{}", payload, escape(key))?;
    }
    writer.flush()?;
    Ok(())
}

struct RunReader {
    lines: Lines<BufReader<File>>,
    numeric: bool,
}

impl RunReader {
    fn open(run: &Run) -> EngineResult<Self> {
        Ok(Self {
            lines: BufReader::new(File::open(&run.path)?).lines(),
            numeric: run.numeric,
        })
    }

    fn next_item(&mut self) -> EngineResult<Option<(RunKey, String, usize)>> {
        match self.lines.next() {
            Some(line) => {
                let (key, payload) = parse_line(&line?)?;
                let run_key = match (self.numeric, key.parse::<i64>()) {
                    (true, Ok(v)) => RunKey::Integer(v),
                    _ => RunKey::Text(key.clone()),
                };
                Ok(Some((run_key, key, payload)))
            }
            None => Ok(None),
        }
    }
}

fn parse_line(line: &str) -> EngineResult<(String, usize)> {
    let malformed = || {
        EngineError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed sort run line: {}", line),
        ))
    };
    let (payload, key) = line.split_once('\t').ok_or_else(malformed)?;
    let payload = payload.parse().map_err(|_| malformed())?;
    Ok((unescape(key), payload))
}

fn merge_runs(state: &RunState) -> EngineResult<Vec<(String, usize)>> {
    let mut readers = Vec::with_capacity(state.runs.len());
    for run in &state.runs {
        readers.push(RunReader::open(run)?);
    }

    let mut heap = BinaryHeap::with_capacity(readers.len());
    for (run, reader) in readers.iter_mut().enumerate() {
        if let Some((run_key, key, payload)) = reader.next_item()? {
            heap.push(Reverse((run_key, run, payload, key)));
        }
    }

    let mut output = Vec::with_capacity(state.total);
    while output.len() < state.total {
        let Some(Reverse((_, run, payload, key))) = heap.pop() else {
            break;
        };
        output.push((key, payload));
        if let Some((run_key, key, payload)) = readers[run].next_item()? {
            heap.push(Reverse((run_key, run, payload, key)));
        }
    }
    Ok(output)
}
