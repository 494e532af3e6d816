use crate::errors::*;
use http::HeaderValue;
use lazy_static::lazy_static;
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

lazy_static! {
    static ref CONTENT_TYPES: BTreeMap<&'static str, HeaderValue> = {
        let mut m = BTreeMap::new();
        m.insert("plain", HeaderValue::from_static("text/plain"));
        m.insert("json", HeaderValue::from_static("application/json"));
        m.insert("xml", HeaderValue::from_static("application/xml"));
        m.insert("html", HeaderValue::from_static("text/html"));
        m
    };
}

/// The content type every response starts out with.
pub fn default_content_type() -> HeaderValue {
    CONTENT_TYPES["html"].clone()
}

/// What a handler asks to render. Structured kinds set their own content type; templates are
/// handed to the application's [ViewRenderer].
#[derive(Debug, Clone, PartialEq)]
pub enum Render {
    /// Render the named template.
    Template(String),
    /// Render the action's own template (`controller/action`).
    Action,
    Plain(String),
    Json(Value),
    Xml(Value),
    Html(String),
}

impl Render {
    pub fn template<T: ToString>(name: T) -> Self {
        Self::Template(name.to_string())
    }

    pub fn plain<T: std::fmt::Display>(content: T) -> Self {
        Self::Plain(content.to_string())
    }

    pub fn html<T: ToString>(content: T) -> Self {
        Self::Html(content.to_string())
    }

    pub fn json<T: Into<Value>>(content: T) -> Self {
        Self::Json(content.into())
    }

    pub fn xml<T: Into<Value>>(content: T) -> Self {
        Self::Xml(content.into())
    }

    /// Build a render from a `{kind: content}` option. Kinds other than plain, json, xml and html
    /// fall back to the action's template.
    pub fn with_kind(kind: &str, content: Value) -> Self {
        match kind {
            "plain" => Self::Plain(text_of(&content)),
            "html" => Self::Html(text_of(&content)),
            "json" => Self::Json(content),
            "xml" => Self::Xml(content),
            _ => Self::Action,
        }
    }

    /// The structured kind, or None for template renders.
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            Self::Plain(_) => Some("plain"),
            Self::Json(_) => Some("json"),
            Self::Xml(_) => Some("xml"),
            Self::Html(_) => Some("html"),
            Self::Template(_) | Self::Action => None,
        }
    }

    /// The content type structured kinds commit with. Templates keep whatever is already set.
    pub fn content_type(&self) -> Option<HeaderValue> {
        self.kind().and_then(|k| CONTENT_TYPES.get(k).cloned())
    }

    /// Format the body of a structured kind. Template kinds return None; they need a renderer.
    pub(crate) fn format_body(&self) -> Result<Option<String>, Error> {
        Ok(match self {
            Self::Plain(s) | Self::Html(s) => Some(s.clone()),
            Self::Json(v) => Some(serde_json::to_string(v)?),
            Self::Xml(v) => Some(to_xml(v)?),
            Self::Template(_) | Self::Action => None,
        })
    }
}

fn text_of(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Data handed to the view renderer alongside the template name.
#[derive(Debug, Clone, Default)]
pub struct ViewData {
    pub assigns: Map<String, Value>,
    pub params: crate::Params,
}

/// External view collaborator: turns a template reference plus view data into a body.
pub trait ViewRenderer: Send + Sync {
    fn render(&self, template: &str, data: &ViewData) -> Result<String, Error>;
}

/// Renderer used when the application never configured one; every template render fails.
#[derive(Debug, Clone, Default)]
pub struct NoViews;

impl ViewRenderer for NoViews {
    fn render(&self, template: &str, _data: &ViewData) -> Result<String, Error> {
        Err(Error::new(format!(
            "no view renderer configured to render template '{}'",
            template
        )))
    }
}

impl<F> ViewRenderer for F
where
    F: Fn(&str, &ViewData) -> Result<String, Error> + Send + Sync,
{
    fn render(&self, template: &str, data: &ViewData) -> Result<String, Error> {
        self(template, data)
    }
}

/// Serialize a value as XML: a `hash` root for objects (`objects` for arrays), dasherized element
/// names and type attributes on non-string scalars.
pub fn to_xml(value: &Value) -> Result<String, Error> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let root = match value {
        Value::Array(_) => "objects",
        _ => "hash",
    };
    write_element(&mut writer, root, value)?;

    let mut out = String::from_utf8(writer.into_inner())?;
    out.push('\n');
    Ok(out)
}

// `name` must already be a valid element name.
fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> Result<(), Error> {
    let mut start = BytesStart::new(name);

    match value {
        Value::Object(map) => {
            writer.write_event(Event::Start(start))?;
            for (key, v) in map {
                write_element(writer, &element_name(key), v)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        Value::Array(items) => {
            start.push_attribute(("type", "array"));
            writer.write_event(Event::Start(start))?;
            let item_name = singular(name);
            for v in items {
                write_element(writer, &item_name, v)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        Value::Null => {
            start.push_attribute(("nil", "true"));
            writer.write_event(Event::Empty(start))?;
        }
        scalar => {
            let text = match scalar {
                Value::Bool(b) => {
                    start.push_attribute(("type", "boolean"));
                    b.to_string()
                }
                Value::Number(n) => {
                    let kind = if n.is_f64() { "float" } else { "integer" };
                    start.push_attribute(("type", kind));
                    n.to_string()
                }
                other => text_of(other),
            };

            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::new(&text)))?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
    }

    Ok(())
}

/// Turn an object key into an element name: underscores and anything else that cannot appear in
/// a name become dashes, a name that cannot start an element gets a leading underscore, and the
/// empty key is written as `key`.
fn element_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '.' => c,
            c if !c.is_ascii() && c.is_alphanumeric() => c,
            _ => '-',
        })
        .collect();

    match name.chars().next() {
        None => name.push_str("key"),
        Some(c) if !c.is_alphabetic() => name.insert(0, '_'),
        _ => {}
    }

    name
}

fn singular(name: &str) -> String {
    match name.strip_suffix('s') {
        Some(stem) if !stem.is_empty() && name != "objects" => stem.to_string(),
        _ => "object".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_types() {
        assert_eq!(Render::plain("x").content_type().unwrap(), "text/plain");
        assert_eq!(Render::json(json!({})).content_type().unwrap(), "application/json");
        assert_eq!(Render::xml(json!({})).content_type().unwrap(), "application/xml");
        assert_eq!(Render::html("x").content_type().unwrap(), "text/html");
        assert!(Render::template("tests/index").content_type().is_none());
        assert!(Render::Action.content_type().is_none());
        assert_eq!(default_content_type(), "text/html");
    }

    #[test]
    fn test_with_kind() {
        assert_eq!(Render::with_kind("plain", json!(42)), Render::Plain("42".to_string()));
        assert_eq!(
            Render::with_kind("plain", json!("hello")),
            Render::Plain("hello".to_string())
        );
        assert_eq!(
            Render::with_kind("json", json!({"message": "x"})),
            Render::Json(json!({"message": "x"}))
        );
        assert_eq!(Render::with_kind("yaml", json!("a: 1")), Render::Action);
    }

    #[test]
    fn test_json_body() {
        let body = Render::json(json!({"message": "x"}))
            .format_body()
            .unwrap()
            .unwrap();
        assert_eq!(body, r#"{"message":"x"}"#);
        assert!(Render::Action.format_body().unwrap().is_none());
    }

    #[test]
    fn test_xml_body() {
        let xml = to_xml(&json!({
            "message": "a < b",
            "count": 3,
            "ok": true,
            "created_at": null,
            "tags": ["one"]
        }))
        .unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains("<hash>"));
        assert!(xml.contains("<message>a &lt; b</message>"));
        assert!(xml.contains(r#"<count type="integer">3</count>"#));
        assert!(xml.contains(r#"<ok type="boolean">true</ok>"#));
        assert!(xml.contains(r#"<created-at nil="true"/>"#));
        assert!(xml.contains(r#"<tags type="array">"#));
        assert!(xml.contains("<tag>one</tag>"));
        assert!(xml.trim_end().ends_with("</hash>"));
    }

    #[test]
    fn test_xml_element_names() {
        assert_eq!(element_name("created_at"), "created-at");
        assert_eq!(element_name("a b"), "a-b");
        assert_eq!(element_name(""), "key");
        assert_eq!(element_name("1st"), "_1st");
        assert_eq!(element_name("-x"), "_-x");
        assert_eq!(element_name("<a>"), "_-a-");
        assert_eq!(element_name("größe"), "größe");

        let xml = to_xml(&json!({"a b": 1, "": 2, "1st": 3})).unwrap();
        assert!(xml.contains(r#"<a-b type="integer">1</a-b>"#));
        assert!(xml.contains(r#"<key type="integer">2</key>"#));
        assert!(xml.contains(r#"<_1st type="integer">3</_1st>"#));
        assert!(!xml.contains("< "));
        assert!(!xml.contains("</>"));

        // array items are named after the sanitized key.
        let xml = to_xml(&json!({"my items": ["x"]})).unwrap();
        assert!(xml.contains(r#"<my-items type="array">"#));
        assert!(xml.contains("<my-item>x</my-item>"));
    }

    #[test]
    fn test_default_content_type() {
        assert_eq!(default_content_type(), Render::html("x").content_type().unwrap());
    }

    #[test]
    fn test_no_views() {
        let err = NoViews
            .render("tests/index", &ViewData::default())
            .unwrap_err();
        assert!(err.to_string().contains("tests/index"));
    }
}
