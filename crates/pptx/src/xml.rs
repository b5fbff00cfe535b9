//! Small helpers shared by the XML readers and rewriters.

use ppt_core::Error;
use quick_xml::events::BytesStart;

/// Extract the local name from a potentially namespaced XML element name.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}

/// Namespace prefix of a qualified name, if any.
pub(crate) fn prefix(name: &[u8]) -> Option<&[u8]> {
    name.iter().position(|&b| b == b':').map(|pos| &name[..pos])
}

/// Value of the attribute whose full (possibly prefixed) name is `key`.
pub(crate) fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Value of the first prefixed attribute with local name `local`
/// (e.g. `r:id`, `r:embed`, `r:link`).
pub(crate) fn prefixed_attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| {
            let key = a.key.as_ref();
            prefix(key).is_some() && local_name(key) == local
        })
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Decode a part as UTF-8 XML text.
pub(crate) fn as_text<'a>(bytes: &'a [u8], part: &str) -> ppt_core::Result<&'a str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(bytes)
        .map_err(|e| Error::XmlError(format!("'{}' is not valid UTF-8: {}", part, e)))
}

pub(crate) fn xml_err(context: &str, e: quick_xml::Error) -> Error {
    Error::XmlError(format!("{}: {}", context, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_name() {
        assert_eq!(local_name(b"p:sp"), b"sp");
        assert_eq!(local_name(b"a:t"), b"t");
        assert_eq!(local_name(b"sp"), b"sp");
        assert_eq!(prefix(b"p14:media"), Some(&b"p14"[..]));
        assert_eq!(prefix(b"id"), None);
    }

    #[test]
    fn test_prefixed_attr_skips_plain_id() {
        let e = BytesStart::new("p:sldId").with_attributes([("id", "256"), ("r:id", "rId7")]);
        assert_eq!(prefixed_attr(&e, b"id").as_deref(), Some("rId7"));
        assert_eq!(attr(&e, b"id").as_deref(), Some("256"));
    }
}
