//! Error types for LarSave

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("format error: {0}")]
    Format(String),

    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    #[error("corrupt file index: {0}")]
    CorruptIndex(String),

    #[error("corrupt block: {0}")]
    CorruptBlock(String),

    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("unsupported compression method: {0:#04x}")]
    UnsupportedCompression(u8),

    #[error("unsupported version: {0}")]
    UnsupportedVersion(u32),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttr(String),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::XmlAttr(err.to_string())
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::Io(err.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
