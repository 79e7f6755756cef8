//! Service modules for the promotion pipeline
//!
//! Sources and the fetcher produce candidate listings, the enricher gates and
//! prices them, the renderer turns a product into message text and the
//! delivery layer pushes it through the messaging gateway. The robot
//! orchestrator drives all of them.

pub mod clock;
pub mod delivery;
pub mod enricher;
pub mod fetcher;
pub mod rate_limiter;
pub mod robot_orchestrator;
pub mod sources;
pub mod template_renderer;
pub mod whatsapp_client;

pub use clock::{Clock, FixedClock, SystemClock};
pub use delivery::{
    dispatch, dispatch_with_retry, ConnectionState, DispatchOutcome, MessageTransport, OutboundMessage,
    RemoteGroup, RetryPolicy, SendReceipt, TransportError,
};
pub use enricher::{EnrichOutcome, Enricher, QualityGate, Rejection};
pub use fetcher::{FetchBatch, FetchFailure, SourceFetcher};
pub use rate_limiter::RateLimiter;
pub use robot_orchestrator::{
    OrchestratorOptions, PairOutcome, RobotDeps, RobotError, RobotOrchestrator, Selection,
};
pub use sources::{FetchError, ListingSource};
pub use template_renderer::{RenderContext, TemplateError};
pub use whatsapp_client::EvolutionClient;
