//! Record encoding shared by shard files and reduce outputs: one JSON object
//! per line, read back as a stream of concatenated JSON values.

use std::io::{self, Read, Write};

use serde_json::{Deserializer, StreamDeserializer};

use crate::common::KeyValue;

pub struct RecordWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn write(&mut self, kv: &KeyValue) -> io::Result<()> {
        serde_json::to_writer(&mut self.inner, kv).map_err(io::Error::from)?;
        self.inner.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Records in stream order. Iteration ends at a clean end of input; anything
/// else that fails to parse comes out as an `Err` item.
pub struct RecordReader<R: Read> {
    stream: StreamDeserializer<'static, serde_json::de::IoRead<R>, KeyValue>,
}

impl<R: Read> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            stream: Deserializer::from_reader(reader).into_iter::<KeyValue>(),
        }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<KeyValue, serde_json::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.next()
    }
}
