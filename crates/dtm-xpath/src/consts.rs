/// Namespace bound to the reserved `xml` prefix.
pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace of W3C-defined XPath error codes (xqt-errors).
pub const ERR_NS: &str = "http://www.w3.org/2005/xqt-errors";

/// Namespace of engine-specific error codes (`DTMX....`).
pub const DTM_ERR_NS: &str = "urn:dtm-xpath:errors";
