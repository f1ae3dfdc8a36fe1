use std::path::PathBuf;

use url::Url;

use crate::error::ReadError;

/// A parsed input file location. Plain paths and `file://` URIs are
/// accepted; remote schemes are rejected with an actionable message.
#[derive(Debug, Clone)]
pub enum SourceUri {
    Local(PathBuf),
}

impl SourceUri {
    pub fn parse(uri: &str) -> Result<Self, ReadError> {
        match Url::parse(uri) {
            Ok(url) if url.scheme() == "file" => {
                let path = url.to_file_path().map_err(|_| ReadError::Unsupported {
                    reason: format!("invalid file:// URI: {}", uri),
                })?;
                Ok(SourceUri::Local(path))
            }
            Ok(url) if url.scheme().len() > 1 => Err(ReadError::Unsupported {
                reason: format!(
                    "unsupported URI scheme '{}' in {} (expected a local path or file:// URI)",
                    url.scheme(),
                    uri
                ),
            }),
            // Not a URL (or a single-letter "scheme", i.e. a Windows drive):
            // treat as a local path.
            _ => Ok(SourceUri::Local(PathBuf::from(uri))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute_path() {
        let uri = SourceUri::parse("/data/part-0001.parquet").unwrap();
        let SourceUri::Local(path) = uri;
        assert_eq!(path, PathBuf::from("/data/part-0001.parquet"));
    }

    #[test]
    fn test_parse_relative_path() {
        assert!(SourceUri::parse("data/file.parquet").is_ok());
    }

    #[test]
    fn test_parse_file_uri() {
        let SourceUri::Local(path) = SourceUri::parse("file:///data/file.parquet").unwrap();
        assert_eq!(path, PathBuf::from("/data/file.parquet"));
    }

    #[test]
    fn test_remote_scheme_is_unsupported() {
        let err = SourceUri::parse("s3://bucket/key.parquet").unwrap_err();
        assert!(matches!(err, ReadError::Unsupported { .. }));
        assert!(err.to_string().contains("s3"));
    }
}
