pub mod report;
pub mod search;
pub mod section;
pub mod stage;

pub use report::{ConclusionAndReferences, FinalReport, FinalSectionContent};
pub use search::{SearchHit, SearchResult, SourceRef};
pub use section::{Feedback, FeedbackValue, Queries, Query, ReflectionVerdict, Section, Sections};
pub use stage::Stage;
