pub mod records;
pub mod run;
pub mod trace;

pub use records::{EnrichedRecord, GlobalRow, MedianRssi, ReceptionRecord, SignalSample};
pub use run::{PayloadMode, RunId, TransmitterPair};
pub use trace::{TraceCell, TraceKind, TraceRow, TraceTable};
