//! Domain types shared across the pipeline (§3 GLOSSARY).

pub mod actor;
pub mod article;
pub mod extraction;
pub mod incident;
pub mod job;
pub mod priority;
pub mod schema;
pub mod span;

pub use actor::{Actor, ActorType};
pub use article::{ArticleStatus, ExtractionPipeline, IngestedArticle};
pub use extraction::{ClassificationHint, DomainRelevance, ExtractionStatus, Stage1Row, Stage2Row};
pub use incident::{Event, Incident, IncidentActorLink, IncidentEventLink, IncidentSourceLink, IncidentStatus};
pub use job::{Job, JobStatus, TaskMetric, TaskMetricAggregate};
pub use priority::Priority;
pub use schema::{Category, Domain, ExtractionSchema, FieldDefinition, FieldType, SchemaType};
pub use span::{SourceSpan, normalize_ws, validate_span, validate_spans};
