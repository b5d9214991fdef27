//! SOAP 1.1 envelope helpers and tolerant element extraction.
//!
//! The authority's responses are small and flat enough that locating elements
//! by local name is sufficient; namespace prefixes and attributes are ignored.

pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Wrap `body` in a SOAP envelope declaring `prefix` for `namespace`
pub fn envelope(prefix: &str, namespace: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><soap:Envelope xmlns:soap="{}" xmlns:{}="{}"><soap:Header/><soap:Body>{}</soap:Body></soap:Envelope>"#,
        SOAP_ENVELOPE_NS, prefix, namespace, body
    )
}

/// Escape text for element content
pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Decode the entities the authority uses in escaped payloads
pub fn decode_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#xD;", "")
        .replace("&#xA;", "\n")
        .replace("&#13;", "")
        .replace("&#10;", "\n")
        .replace("&amp;", "&")
}

/// Byte ranges of one element: content start, content end, element end
struct ElementSpan {
    content_start: usize,
    content_end: usize,
    end: usize,
}

fn find_element(xml: &str, tag: &str, from: usize) -> Option<ElementSpan> {
    let mut pos = from;

    while let Some(rel) = xml.get(pos..)?.find('<') {
        let lt = pos + rel;
        let rest = &xml[lt + 1..];

        if rest.starts_with('/') || rest.starts_with('!') || rest.starts_with('?') {
            pos = lt + 1;
            continue;
        }

        let name_len = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let name = &rest[..name_len];
        let local = name.rsplit(':').next().unwrap_or(name);

        if local == tag {
            let gt = lt + 1 + rest.find('>')?;
            if xml[..gt].ends_with('/') {
                return Some(ElementSpan {
                    content_start: gt + 1,
                    content_end: gt + 1,
                    end: gt + 1,
                });
            }

            let content_start = gt + 1;
            let close = format!("</{}>", name);
            let content_end = content_start + xml[content_start..].find(&close)?;
            return Some(ElementSpan {
                content_start,
                content_end,
                end: content_end + close.len(),
            });
        }

        pos = lt + 1;
    }

    None
}

/// Trimmed content of the first element named `tag`, any prefix
pub fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    find_element(xml, tag, 0).map(|span| xml[span.content_start..span.content_end].trim().to_string())
}

/// Raw content of every element named `tag`, in document order
pub fn extract_all<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(span) = find_element(xml, tag, pos) {
        found.push(&xml[span.content_start..span.content_end]);
        pos = span.end;
    }
    found
}

/// `faultstring` of a SOAP fault, if the response is one
pub fn fault_string(xml: &str) -> Option<String> {
    find_element(xml, "Fault", 0)?;
    Some(
        extract_tag(xml, "faultstring")
            .map(|f| decode_entities(&f))
            .unwrap_or_else(|| "Unknown SOAP fault".to_string()),
    )
}
