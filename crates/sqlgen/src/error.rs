use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenerationError>;

#[derive(Error, Debug)]
pub enum GenerationError {
    /// Neither a template match nor a usable fallback search term.
    #[error("nothing to search: no entities and no usable text")]
    NothingToSearch,

    /// A user-influenced value ended up verbatim in the statement body.
    /// This fails closed: the query is rejected, never executed.
    #[error("user text bound into statement body (template {template_id})")]
    UnboundUserText { template_id: String },
}
