//! JSON plan output

use super::{async_trait, ActionEmitter};
use crate::error::Result;
use crate::models::{ScheduledAction, Timeline};
use std::io::Write;

/// Writes the whole timeline as one JSON document once the replay finishes
pub struct JsonEmitter<W> {
    out: W,
}

impl<W: Write + Send> JsonEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[async_trait]
impl<W: Write + Send> ActionEmitter for JsonEmitter<W> {
    async fn emit(&mut self, _action: &ScheduledAction) -> Result<()> {
        Ok(())
    }

    async fn finish(&mut self, timeline: &Timeline) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.out, timeline)?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}
