use thiserror::Error;

/// Caller errors detected while building directives from request parameters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// `fields=name,-price`: a projection is either an inclusion or an exclusion list.
    #[error("Projection cannot mix included and excluded fields: {0}")]
    MixedProjection(String),

    /// A comparison operator was given without a field name (`[gte]=5`).
    #[error("Filter operator '{0}' is missing a field name")]
    MissingField(String),
}
