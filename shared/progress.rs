use std::fmt;

/// Stages reported while encoding a batch of annotations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EncodeProgressStage {
    Encoding,
}

impl EncodeProgressStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Encoding => "annotation index encoding",
        }
    }
}

impl fmt::Display for EncodeProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for reporting incremental progress while encoding annotations.
pub trait EncodeProgressObserver {
    fn on_stage_start(&mut self, stage: EncodeProgressStage, total_variants: usize) {
        let _ = (stage, total_variants);
    }
    fn on_stage_advance(&mut self, stage: EncodeProgressStage, processed_variants: usize) {
        let _ = (stage, processed_variants);
    }
    fn on_stage_finish(&mut self, stage: EncodeProgressStage) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopEncodeProgress;

impl EncodeProgressObserver for NoopEncodeProgress {}
