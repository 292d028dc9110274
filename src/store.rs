//! Append-only record stores backed by JSON-lines files

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use log::{debug, error};
use crate::error::Error;

/// Replay order for snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order
{   Ascending
  , Descending
}

/// Append and read back; nothing is ever updated in place
pub trait RecordStore<R>
{   fn append(&mut self, record: &R) -> Result<(), Error>;
    fn snapshot(&self) -> Result<Vec<R>, Error>;
}

/// One record per line. The file is created on first append.
///
/// I/O is blocking `std::fs`. Callers await one request at a time and
/// each append is a single short line, so nothing else is waiting on
/// the runtime thread meanwhile.
#[derive(Debug, Clone)]
pub struct JsonlStore<R>
{   path: PathBuf
  , order: Order
  , _record: PhantomData<R>
}

impl<R> JsonlStore<R>
{   pub fn new(path: impl Into<PathBuf>, order: Order) -> Self
    {   JsonlStore
        {   path: path.into()
          , order
          , _record: PhantomData
        }
    }

    pub fn path(&self) -> &Path
    {   &self.path
    }

    pub fn order(&self) -> Order
    {   self.order
    }
}

impl<R> RecordStore<R> for JsonlStore<R>
where
  R: Serialize + DeserializeOwned
{   fn append(&mut self, record: &R) -> Result<(), Error>
    {   if let Some(dir) = self.path.parent()
        {   if !dir.as_os_str().is_empty()
            {   std::fs::create_dir_all(dir)
                  .map_err(|e| io_error("creating directory", dir, e))?;
            }
        }
        let mut line = serde_json::to_string(record)
          .map_err(|e| Error::StoreError(e.to_string()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
          .create(true)
          .append(true)
          .open(&self.path)
          .map_err(|e| io_error("opening for append", &self.path, e))?;
        file.write_all(line.as_bytes())
          .map_err(|e| io_error("appending to", &self.path, e))?;
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<R>, Error>
    {   let file = match File::open(&self.path)
        {   Ok(file) => file
          , Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
              debug!("{} does not exist yet", self.path.display());
              return Ok(Vec::new());
            }
          , Err(e) => return Err(io_error("opening", &self.path, e))
        };

        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate()
        {   let line = line
              .map_err(|e| io_error("reading", &self.path, e))?;
            if line.trim().is_empty()
            {   continue;
            }
            let record = serde_json::from_str(&line)
              .map_err(|e| {
                error!(
                  "Bad record at {}:{}: {}",
                  self.path.display(), index + 1, e
                );
                Error::StoreError(format!(
                  "{}:{}: {}", self.path.display(), index + 1, e
                ))
              })?;
            records.push(record);
        }

        if self.order == Order::Descending
        {   records.reverse();
        }
        Ok(records)
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> Error
{   error!("Failed {} {}: {}", action, path.display(), e);
    Error::StoreError(format!("{} {}: {}", action, path.display(), e))
}

#[cfg(test)]
mod tests
{   use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row
    {   n: u32
    }

    #[test]
    fn missing_file_is_empty()
    {   let dir = tempfile::tempdir().unwrap();
        let store: JsonlStore<Row>
          = JsonlStore::new(dir.path().join("none.jsonl"), Order::Ascending);
        assert!(store.snapshot().unwrap().is_empty());
    }

    #[test]
    fn replays_in_either_order()
    {   let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/rows.jsonl");
        let mut store: JsonlStore<Row> = JsonlStore::new(&path, Order::Ascending);
        for n in 1..=3
        {   store.append(&Row { n }).unwrap();
        }
        let asc: Vec<u32> = store.snapshot().unwrap()
          .into_iter().map(|r| r.n).collect();
        assert_eq!(asc, vec![1, 2, 3]);

        let desc: JsonlStore<Row> = JsonlStore::new(&path, Order::Descending);
        let desc: Vec<u32> = desc.snapshot().unwrap()
          .into_iter().map(|r| r.n).collect();
        assert_eq!(desc, vec![3, 2, 1]);
    }

    #[test]
    fn corrupt_line_is_reported()
    {   let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        std::fs::write(&path, "{\"n\":1}\nnot json\n").unwrap();
        let store: JsonlStore<Row> = JsonlStore::new(&path, Order::Ascending);
        match store.snapshot()
        {   Err(Error::StoreError(msg)) => assert!(msg.contains(":2:"))
          , other => panic!("expected store error, got {:?}", other)
        }
    }
}
