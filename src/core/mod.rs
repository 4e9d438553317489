pub mod cache;
pub mod engine;
pub mod executor;
pub mod narrator;
pub mod planner;
pub mod stitcher;
pub mod telemetry;

// Re-export commonly used types for convenience
pub use cache::{CacheError, CacheKey, FilesystemCache, MemoryCache, SynthesisCache};

pub use engine::{
    CommandEngine, EngineConfig, EngineSettings, HttpEngine, SynthesisEngine, SynthesisError,
    SynthesisRequest, create_synthesis_engine,
};

pub use executor::{
    ChunkAssignment, ExecutorError, ExecutorSettings, JobStatus, RetryPolicy, SynthesisExecutor,
    SynthesisJob,
};

pub use narrator::{NarrationOutcome, Narrator, plan_script};

pub use planner::{Chunk, PlanningError, Script, SpeakerSegment, plan};

pub use stitcher::{AudioStitcher, StitchError, StitchPlan, StitchSettings, StitchSummary};

pub use telemetry::{
    ChunkRecord, ChunkStatus, RunOutcome, RunStatus, TelemetryError, TelemetryRecorder,
    TelemetryReport,
};
