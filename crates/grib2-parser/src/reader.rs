//! Sequential reader over a buffer of concatenated GRIB2 messages.

use crate::error::{Grib2Error, Grib2Result};
use crate::message::Grib2Message;
use crate::sections;
use crate::tables::Grib2Tables;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Iterates GRIB2 messages in file order.
pub struct Grib2Reader {
    data: Bytes,
    position: usize,
    tables: Arc<Grib2Tables>,
}

impl Grib2Reader {
    pub fn new(data: Bytes, tables: Arc<Grib2Tables>) -> Self {
        Self {
            data,
            position: 0,
            tables,
        }
    }

    /// Read a whole file into memory and create a reader over it.
    pub fn open(path: impl AsRef<Path>, tables: Arc<Grib2Tables>) -> Grib2Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        debug!(path = %path.as_ref().display(), bytes = data.len(), "Opened GRIB2 file");
        Ok(Self::new(Bytes::from(data), tables))
    }

    /// Total size of the underlying buffer.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Return the next message, or `None` once no further `GRIB` marker exists.
    pub fn next_message(&mut self) -> Grib2Result<Option<Grib2Message>> {
        let start = match find_magic(&self.data, self.position) {
            Some(start) => start,
            None => {
                self.position = self.data.len();
                return Ok(None);
            }
        };

        if start != self.position {
            warn!(
                skipped = start - self.position,
                offset = self.position,
                "Skipped bytes before GRIB marker"
            );
        }

        let indicator = sections::parse_indicator(&self.data[start..])?;
        let length = usize::try_from(indicator.message_length).map_err(|_| {
            Grib2Error::InvalidFormat(format!(
                "message length {} does not fit in memory",
                indicator.message_length
            ))
        })?;
        let end = start
            .checked_add(length)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                Grib2Error::InvalidFormat(format!(
                    "message at offset {} claims {} bytes, only {} remain",
                    start,
                    length,
                    self.data.len() - start
                ))
            })?;

        if length < 20 || &self.data[end - 4..end] != b"7777" {
            return Err(Grib2Error::InvalidFormat(format!(
                "message at offset {} is missing its 7777 end marker",
                start
            )));
        }

        self.position = end;
        let raw = self.data.slice(start..end);
        Grib2Message::parse(raw, start, self.tables.clone()).map(Some)
    }

    /// Read every remaining message.
    pub fn messages(&mut self) -> Grib2Result<Vec<Grib2Message>> {
        let mut messages = Vec::new();
        while let Some(message) = self.next_message()? {
            messages.push(message);
        }
        Ok(messages)
    }
}

fn find_magic(data: &[u8], from: usize) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(4)
        .position(|w| w == b"GRIB")
        .map(|p| p + from)
}
