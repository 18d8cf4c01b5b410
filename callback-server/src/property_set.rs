//! Parsing of UPnP event property-set bodies.
//!
//! A NOTIFY body looks like:
//!
//! ```xml
//! <e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
//!     <e:property>
//!         <BinaryState>1</BinaryState>
//!     </e:property>
//! </e:propertyset>
//! ```
//!
//! Every `property` element wraps exactly one value element. The property set is
//! flattened into a map from value element name to its text content.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

/// Errors produced while parsing a property-set body.
#[derive(Debug, thiserror::Error)]
pub enum PropertySetError {
    /// Non-whitespace text appeared before or after the root element.
    ///
    /// Some device firmware appends trailing bytes to otherwise valid
    /// notifications, so callers treat this case as noise.
    #[error("Text data outside of root node")]
    TextOutsideRoot,

    /// The document root is not a `propertyset` element.
    #[error("Unexpected root element: {0}")]
    UnexpectedRoot(String),

    /// A second top-level element followed the property set.
    #[error("Multiple root elements")]
    MultipleRoots,

    /// The body contained no element at all.
    #[error("Empty property set document")]
    Empty,

    /// The document ended before the root element was closed.
    #[error("Unterminated property set document")]
    Unterminated,

    /// The underlying XML reader rejected the document.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl PropertySetError {
    /// Whether this failure is known firmware noise that should not be logged.
    pub fn is_benign(&self) -> bool {
        matches!(self, PropertySetError::TextOutsideRoot)
    }
}

/// Flatten a property-set document into `property name -> value`.
///
/// Namespace prefixes on `propertyset` and `property` are ignored; value element
/// names are kept exactly as sent. When the same property appears twice the last
/// occurrence wins. Elements nested below a value element are skipped.
pub fn parse_property_set(xml: &str) -> Result<HashMap<String, String>, PropertySetError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut values = HashMap::new();
    let mut depth = 0usize;
    let mut seen_root = false;
    let mut in_property = false;
    let mut current: Option<(String, String)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                match depth {
                    0 => {
                        check_root(element.local_name().as_ref(), seen_root)?;
                        seen_root = true;
                    }
                    1 => in_property = element.local_name().as_ref() == b"property",
                    2 if in_property => {
                        let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                        current = Some((name, String::new()));
                    }
                    _ => {}
                }
                depth += 1;
            }
            Event::Empty(element) => match depth {
                0 => {
                    check_root(element.local_name().as_ref(), seen_root)?;
                    seen_root = true;
                }
                2 if in_property => {
                    let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                    values.insert(name, String::new());
                }
                _ => {}
            },
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                match depth {
                    2 => {
                        if let Some((name, value)) = current.take() {
                            values.insert(name, value);
                        }
                    }
                    1 => in_property = false,
                    _ => {}
                }
            }
            Event::Text(text) => {
                if depth == 0 {
                    return Err(PropertySetError::TextOutsideRoot);
                }
                if depth == 3 {
                    if let Some((_, value)) = current.as_mut() {
                        value.push_str(&text.unescape()?);
                    }
                }
            }
            Event::CData(data) => {
                if depth == 0 {
                    return Err(PropertySetError::TextOutsideRoot);
                }
                if depth == 3 {
                    if let Some((_, value)) = current.as_mut() {
                        value.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(PropertySetError::Unterminated);
    }
    if !seen_root {
        return Err(PropertySetError::Empty);
    }

    Ok(values)
}

fn check_root(local_name: &[u8], seen_root: bool) -> Result<(), PropertySetError> {
    if seen_root {
        return Err(PropertySetError::MultipleRoots);
    }
    if local_name != b"propertyset" {
        return Err(PropertySetError::UnexpectedRoot(
            String::from_utf8_lossy(local_name).into_owned(),
        ));
    }
    Ok(())
}
