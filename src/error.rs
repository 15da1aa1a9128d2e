use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum PageDiffError {
    MissingInput(PathBuf),
    HistoryNotRenamed { legacy: String, modern: String },
    BackendPolicyDenied(String),
    BackendResourceExhausted(String),
    Backend(String),
    InvalidConfiguration(String),
    Image(String),
    Io(std::io::Error),
}

impl fmt::Display for PageDiffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageDiffError::MissingInput(path) => {
                write!(f, "required input file [{}] not found", path.display())
            }
            PageDiffError::HistoryNotRenamed { legacy, modern } => {
                write!(
                    f,
                    "previous export render not renamed. rename s/.{modern}_mso.pdf/.{legacy}_mso.pdf/ {legacy}/*.{modern}_mso.pdf"
                )
            }
            PageDiffError::BackendPolicyDenied(detail) => {
                write!(
                    f,
                    "raster backend refused by policy: {} (add a PDF rights policy to /etc/ImageMagick-*/policy.xml)",
                    detail
                )
            }
            PageDiffError::BackendResourceExhausted(detail) => {
                write!(
                    f,
                    "raster backend out of cache resources: {} (raise the disk resource in /etc/ImageMagick-*/policy.xml, e.g. <policy domain=\"resource\" name=\"disk\" value=\"16GiB\"/>)",
                    detail
                )
            }
            PageDiffError::Backend(detail) => write!(f, "raster backend failed: {}", detail),
            PageDiffError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            PageDiffError::Image(message) => write!(f, "image error: {}", message),
            PageDiffError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for PageDiffError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PageDiffError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PageDiffError {
    fn from(value: std::io::Error) -> Self {
        PageDiffError::Io(value)
    }
}
