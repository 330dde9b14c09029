use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("PDF construction failed: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Image encoding failed: {0}")]
    Image(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
