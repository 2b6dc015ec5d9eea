//! Schema compilation and whole-document validation.
//!
//! Schemas use JSON Schema. A schema is compiled once into an opaque
//! [`Schema`] handle; validation walks the entire merged document and reports
//! every violation rather than stopping at the first. Local references
//! (`#/$defs/...`, `#/definitions/...`) are resolved at compile time.
//!
//! Validation is strict:
//! - object schemas that list `properties` or `patternProperties` reject
//!   unknown keys unless `additionalProperties` says otherwise
//! - values are never coerced (`"65536"` is a string, not an integer)

use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};
use tracing::debug;

use super::error::Violation;
use super::file::kind;
use super::ConfigError;

/// Keywords that carry no validation meaning and are accepted silently.
const ANNOTATIONS: &[&str] = &[
    "$schema",
    "$id",
    "$anchor",
    "$comment",
    "title",
    "description",
    "default",
    "examples",
    "deprecated",
    "readOnly",
    "writeOnly",
];

/// Validates a merged configuration document.
///
/// [`Schema`] is the built-in engine. Another engine can be handed to a
/// [`Loader`](super::Loader) through `with_validator`.
pub trait SchemaValidator: Send + Sync + fmt::Debug {
    /// Accepts the document as a [`ValidatedConfig`], or fails with
    /// [`ConfigError::ValidationError`] listing every violation.
    fn validate(&self, config: Map<String, Value>) -> Result<ValidatedConfig, ConfigError>;
}

/// A compiled schema.
///
/// Cheap to clone; the compiled tree is shared.
#[derive(Debug, Clone)]
pub struct Schema {
    tree: Arc<Tree>,
}

#[derive(Debug)]
struct Tree {
    root: Node,
    /// Reference targets, indexed by [`Node::reference`].
    defs: Vec<Node>,
}

impl Schema {
    /// Compiles a schema document.
    ///
    /// Fails with [`ConfigError::InvalidSchema`] if a keyword has the wrong
    /// kind of value, a type or format name is unknown, a regex is invalid, or
    /// a `$ref` cannot be resolved. Unrecognised keywords are ignored.
    pub fn compile(document: &Value) -> Result<Self, ConfigError> {
        let mut compiler = Compiler::new(document);
        let root = compiler.node(document, "#", true)?;
        let tree = compiler.finish(root)?;
        Ok(Self {
            tree: Arc::new(tree),
        })
    }

    /// Reads a schema document from a JSON file and compiles it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::file_read(path, e)),
        };
        let document: Value =
            serde_json::from_str(&text).map_err(|source| ConfigError::ParseError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::compile(&document)
    }

    /// Validates a merged configuration.
    ///
    /// On failure the error carries every violation found.
    pub fn validate(&self, config: Map<String, Value>) -> Result<ValidatedConfig, ConfigError> {
        let mut violations = Vec::new();
        self.tree
            .root
            .check(&self.tree.defs, Instance::Object(&config), "", &mut violations);

        if !violations.is_empty() {
            return Err(ConfigError::ValidationError(violations));
        }
        Ok(ValidatedConfig::new(config))
    }
}

impl SchemaValidator for Schema {
    fn validate(&self, config: Map<String, Value>) -> Result<ValidatedConfig, ConfigError> {
        Schema::validate(self, config)
    }
}

/// A merged configuration that has passed schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig(Arc<Map<String, Value>>);

impl ValidatedConfig {
    /// Wraps a document that a [`SchemaValidator`] has accepted.
    pub fn new(map: Map<String, Value>) -> Self {
        Self(Arc::new(map))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Looks up a dotted path such as `server.port`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.as_ref().clone())
    }

    /// Deserializes the configuration into a caller-defined type.
    ///
    /// A type that does not match the validated document is a
    /// [`ConfigError::LoadError`].
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        serde_json::from_value(self.to_value()).map_err(|e| {
            ConfigError::load(
                format!("validated configuration does not fit the target type: {e}"),
                Some(Box::new(e)),
            )
        })
    }
}

impl Serialize for ValidatedConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// The value being checked. The document root is borrowed as a bare map.
#[derive(Debug, Clone, Copy)]
enum Instance<'a> {
    Value(&'a Value),
    Object(&'a Map<String, Value>),
}

impl Instance<'_> {
    fn kind(self) -> &'static str {
        match self {
            Self::Value(value) => kind(value),
            Self::Object(_) => "object",
        }
    }

    fn to_value(self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Object(map) => Value::Object(map.clone()),
        }
    }

    fn equals(self, expected: &Value) -> bool {
        match self {
            Self::Value(value) => json_eq(value, expected),
            Self::Object(map) => expected.as_object().is_some_and(|e| map_eq(map, e)),
        }
    }
}

/// Equality as JSON Schema defines it: numbers compare by value, so `1`
/// equals `1.0`.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_eq(x, y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(x), Value::Object(y)) => map_eq(x, y),
        _ => a == b,
    }
}

fn number_eq(x: &Number, y: &Number) -> bool {
    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
        return x == y;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn map_eq(x: &Map<String, Value>, y: &Map<String, Value>) -> bool {
    x.len() == y.len()
        && x.iter()
            .all(|(key, value)| y.get(key).is_some_and(|other| json_eq(value, other)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl JsonType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "object" => Self::Object,
            "array" => Self::Array,
            "string" => Self::String,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "boolean" => Self::Boolean,
            "null" => Self::Null,
            _ => return None,
        })
    }

    fn matches(self, instance: Instance<'_>) -> bool {
        let value = match instance {
            Instance::Object(_) => return self == Self::Object,
            Instance::Value(value) => value,
        };
        match (self, value) {
            (Self::Object, Value::Object(_))
            | (Self::Array, Value::Array(_))
            | (Self::String, Value::String(_))
            | (Self::Number, Value::Number(_))
            | (Self::Boolean, Value::Bool(_))
            | (Self::Null, Value::Null) => true,
            (Self::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Null => "null",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringFormat {
    Email,
    Uri,
    Hostname,
    Ipv4,
    Ipv6,
    DateTime,
}

impl StringFormat {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "email" => Self::Email,
            "uri" => Self::Uri,
            "hostname" => Self::Hostname,
            "ipv4" => Self::Ipv4,
            "ipv6" => Self::Ipv6,
            "date-time" => Self::DateTime,
            _ => return None,
        })
    }

    fn accepts(self, s: &str) -> bool {
        match self {
            Self::Email => is_email(s),
            Self::Uri => url::Url::parse(s).is_ok(),
            Self::Hostname => is_hostname(s),
            Self::Ipv4 => s.parse::<Ipv4Addr>().is_ok(),
            Self::Ipv6 => s.parse::<Ipv6Addr>().is_ok(),
            Self::DateTime => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
        }
    }
}

impl fmt::Display for StringFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Email => "email",
            Self::Uri => "uri",
            Self::Hostname => "hostname",
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
            Self::DateTime => "date-time",
        })
    }
}

#[derive(Debug, Default)]
enum Additional {
    #[default]
    Allow,
    Deny,
    Schema(Box<Node>),
}

#[derive(Debug, Default)]
struct Node {
    /// `false` schema: nothing validates.
    never: bool,
    reference: Option<usize>,
    types: Option<Vec<JsonType>>,
    enum_values: Option<Vec<Value>>,
    const_value: Option<Value>,
    all_of: Vec<Node>,
    any_of: Vec<Node>,
    one_of: Vec<Node>,
    not: Option<Box<Node>>,
    condition: Option<Box<Node>>,
    then: Option<Box<Node>>,
    otherwise: Option<Box<Node>>,
    // objects
    properties: Vec<(String, Node)>,
    pattern_properties: Vec<(Regex, Node)>,
    required: Vec<String>,
    dependent_required: Vec<(String, Vec<String>)>,
    additional: Additional,
    property_names: Option<Box<Node>>,
    min_properties: Option<usize>,
    max_properties: Option<usize>,
    // arrays
    items: Option<Box<Node>>,
    contains: Option<Box<Node>>,
    min_items: Option<usize>,
    max_items: Option<usize>,
    unique_items: bool,
    // numbers
    minimum: Option<f64>,
    maximum: Option<f64>,
    exclusive_minimum: Option<f64>,
    exclusive_maximum: Option<f64>,
    multiple_of: Option<f64>,
    // strings
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
    format: Option<StringFormat>,
}

/// Compiles one schema document, resolving `$ref`s against it.
struct Compiler<'a> {
    document: &'a Value,
    defs: Vec<Option<Node>>,
    pointers: Vec<String>,
    targets: HashMap<String, usize>,
}

impl<'a> Compiler<'a> {
    fn new(document: &'a Value) -> Self {
        Self {
            document,
            defs: Vec::new(),
            pointers: Vec::new(),
            targets: HashMap::new(),
        }
    }

    /// `strict` turns on the closed-object default. Branches of `allOf`,
    /// `anyOf`, `oneOf`, `not` and `if` describe part of a shape, so they
    /// are compiled open.
    fn node(&mut self, schema: &Value, pointer: &str, strict: bool) -> Result<Node, ConfigError> {
        let keywords = match schema {
            Value::Bool(true) => return Ok(Node::default()),
            Value::Bool(false) => {
                return Ok(Node {
                    never: true,
                    ..Node::default()
                })
            }
            Value::Object(keywords) => keywords,
            other => {
                return Err(ConfigError::invalid_schema(
                    pointer,
                    format!("schema must be an object or boolean, found {}", kind(other)),
                ))
            }
        };

        let mut node = Node::default();
        let mut declares_properties = false;
        let mut declares_additional = false;

        for (keyword, value) in keywords {
            let at = format!("{pointer}/{}", escape_pointer(keyword));
            match keyword.as_str() {
                "$ref" => {
                    let target = value
                        .as_str()
                        .ok_or_else(|| ConfigError::invalid_schema(&at, "$ref must be a string"))?;
                    node.reference = Some(self.reference(target, &at)?);
                }
                "$defs" | "definitions" => {
                    // Compiled eagerly so a broken definition fails even when unused.
                    for name in expect_object(value, &at)?.keys() {
                        let target = format!("{at}/{}", escape_pointer(name));
                        self.reference(&target, &at)?;
                    }
                }
                "type" => node.types = Some(compile_types(value, &at)?),
                "enum" => match value {
                    Value::Array(values) if !values.is_empty() => {
                        node.enum_values = Some(values.clone());
                    }
                    _ => {
                        return Err(ConfigError::invalid_schema(
                            at,
                            "enum must be a non-empty array",
                        ))
                    }
                },
                "const" => node.const_value = Some(value.clone()),
                "allOf" => node.all_of = self.branches(value, &at)?,
                "anyOf" => node.any_of = self.branches(value, &at)?,
                "oneOf" => node.one_of = self.branches(value, &at)?,
                "not" => node.not = Some(Box::new(self.node(value, &at, false)?)),
                "if" => node.condition = Some(Box::new(self.node(value, &at, false)?)),
                "then" => node.then = Some(Box::new(self.node(value, &at, false)?)),
                "else" => node.otherwise = Some(Box::new(self.node(value, &at, false)?)),
                "properties" => {
                    declares_properties = true;
                    for (name, sub) in expect_object(value, &at)? {
                        let sub = self.node(sub, &format!("{at}/{}", escape_pointer(name)), true)?;
                        node.properties.push((name.clone(), sub));
                    }
                }
                "patternProperties" => {
                    declares_properties = true;
                    for (pattern, sub) in expect_object(value, &at)? {
                        let sub_at = format!("{at}/{}", escape_pointer(pattern));
                        let regex = compile_regex(pattern, &sub_at)?;
                        node.pattern_properties
                            .push((regex, self.node(sub, &sub_at, true)?));
                    }
                }
                "required" => node.required = expect_strings(value, &at)?,
                "dependentRequired" => {
                    for (name, needs) in expect_object(value, &at)? {
                        let sub_at = format!("{at}/{}", escape_pointer(name));
                        node.dependent_required
                            .push((name.clone(), expect_strings(needs, &sub_at)?));
                    }
                }
                "additionalProperties" => {
                    declares_additional = true;
                    node.additional = match value {
                        Value::Bool(true) => Additional::Allow,
                        Value::Bool(false) => Additional::Deny,
                        other => Additional::Schema(Box::new(self.node(other, &at, true)?)),
                    };
                }
                "propertyNames" => {
                    node.property_names = Some(Box::new(self.node(value, &at, true)?));
                }
                "minProperties" => node.min_properties = Some(expect_count(value, &at)?),
                "maxProperties" => node.max_properties = Some(expect_count(value, &at)?),
                "items" => node.items = Some(Box::new(self.node(value, &at, true)?)),
                "contains" => node.contains = Some(Box::new(self.node(value, &at, true)?)),
                "minItems" => node.min_items = Some(expect_count(value, &at)?),
                "maxItems" => node.max_items = Some(expect_count(value, &at)?),
                "uniqueItems" => node.unique_items = expect_bool(value, &at)?,
                "minimum" => node.minimum = Some(expect_number(value, &at)?),
                "maximum" => node.maximum = Some(expect_number(value, &at)?),
                "exclusiveMinimum" => node.exclusive_minimum = Some(expect_number(value, &at)?),
                "exclusiveMaximum" => node.exclusive_maximum = Some(expect_number(value, &at)?),
                "multipleOf" => {
                    let n = expect_number(value, &at)?;
                    if n <= 0.0 {
                        return Err(ConfigError::invalid_schema(
                            at,
                            "multipleOf must be greater than zero",
                        ));
                    }
                    node.multiple_of = Some(n);
                }
                "minLength" => node.min_length = Some(expect_count(value, &at)?),
                "maxLength" => node.max_length = Some(expect_count(value, &at)?),
                "pattern" => {
                    let pattern = value.as_str().ok_or_else(|| {
                        ConfigError::invalid_schema(&at, "pattern must be a string")
                    })?;
                    node.pattern = Some(compile_regex(pattern, &at)?);
                }
                "format" => {
                    let name = value.as_str().ok_or_else(|| {
                        ConfigError::invalid_schema(&at, "format must be a string")
                    })?;
                    let format = StringFormat::parse(name).ok_or_else(|| {
                        ConfigError::invalid_schema(&at, format!("unknown format '{name}'"))
                    })?;
                    node.format = Some(format);
                }
                other if ANNOTATIONS.contains(&other) => {}
                other => {
                    debug!(keyword = other, pointer = %at, "ignoring unrecognised schema keyword");
                }
            }
        }

        if node.condition.is_none() {
            node.then = None;
            node.otherwise = None;
        }
        if strict && declares_properties && !declares_additional {
            node.additional = Additional::Deny;
        }

        Ok(node)
    }

    fn branches(&mut self, value: &Value, at: &str) -> Result<Vec<Node>, ConfigError> {
        match value {
            Value::Array(schemas) if !schemas.is_empty() => schemas
                .iter()
                .enumerate()
                .map(|(i, schema)| self.node(schema, &format!("{at}/{i}"), false))
                .collect(),
            _ => Err(ConfigError::invalid_schema(
                at,
                "expected a non-empty array of schemas",
            )),
        }
    }

    /// Returns the index of the compiled target of `reference`, compiling it
    /// on first use. The slot is reserved first so recursive schemas resolve.
    fn reference(&mut self, reference: &str, at: &str) -> Result<usize, ConfigError> {
        if let Some(&index) = self.targets.get(reference) {
            return Ok(index);
        }
        let pointer = reference.strip_prefix('#').ok_or_else(|| {
            ConfigError::invalid_schema(
                at,
                format!("only local references are supported, found '{reference}'"),
            )
        })?;
        let document = self.document;
        let target = document.pointer(pointer).ok_or_else(|| {
            ConfigError::invalid_schema(at, format!("unresolvable reference '{reference}'"))
        })?;

        let index = self.defs.len();
        self.defs.push(None);
        self.pointers.push(reference.to_string());
        self.targets.insert(reference.to_string(), index);

        let node = self.node(target, reference, true)?;
        self.defs[index] = Some(node);
        Ok(index)
    }

    fn finish(self, root: Node) -> Result<Tree, ConfigError> {
        // Every reserved slot is filled once compilation succeeds.
        let defs: Vec<Node> = self.defs.into_iter().map(Option::unwrap_or_default).collect();
        if let Some(index) = find_cycle(&defs) {
            return Err(ConfigError::invalid_schema(
                &self.pointers[index],
                "reference cycle never descends into the document",
            ));
        }
        Ok(Tree { root, defs })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unseen,
    Active,
    Done,
}

/// Finds a reference target that reaches itself without moving to a child
/// value, which would never terminate during validation.
fn find_cycle(defs: &[Node]) -> Option<usize> {
    fn visit(index: usize, defs: &[Node], marks: &mut [Mark]) -> Option<usize> {
        match marks[index] {
            Mark::Active => return Some(index),
            Mark::Done => return None,
            Mark::Unseen => {}
        }
        marks[index] = Mark::Active;
        let mut next = Vec::new();
        defs[index].in_place_refs(&mut next);
        for target in next {
            if let Some(found) = visit(target, defs, marks) {
                return Some(found);
            }
        }
        marks[index] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::Unseen; defs.len()];
    (0..defs.len()).find_map(|index| visit(index, defs, &mut marks))
}

fn compile_types(value: &Value, at: &str) -> Result<Vec<JsonType>, ConfigError> {
    let parse = |name: &Value| {
        name.as_str()
            .and_then(JsonType::parse)
            .ok_or_else(|| ConfigError::invalid_schema(at, format!("unknown type {name}")))
    };
    match value {
        Value::String(_) => Ok(vec![parse(value)?]),
        Value::Array(names) if !names.is_empty() => names.iter().map(parse).collect(),
        _ => Err(ConfigError::invalid_schema(
            at,
            "type must be a type name or a non-empty array of type names",
        )),
    }
}

fn compile_regex(pattern: &str, at: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern)
        .map_err(|e| ConfigError::invalid_schema(at, format!("invalid pattern: {e}")))
}

fn expect_object<'a>(value: &'a Value, at: &str) -> Result<&'a Map<String, Value>, ConfigError> {
    value
        .as_object()
        .ok_or_else(|| ConfigError::invalid_schema(at, "expected an object"))
}

fn expect_strings(value: &Value, at: &str) -> Result<Vec<String>, ConfigError> {
    let invalid = || ConfigError::invalid_schema(at, "expected an array of strings");
    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
        .collect()
}

fn expect_count(value: &Value, at: &str) -> Result<usize, ConfigError> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| ConfigError::invalid_schema(at, "expected a non-negative integer"))
}

fn expect_number(value: &Value, at: &str) -> Result<f64, ConfigError> {
    value
        .as_f64()
        .ok_or_else(|| ConfigError::invalid_schema(at, "expected a number"))
}

fn expect_bool(value: &Value, at: &str) -> Result<bool, ConfigError> {
    value
        .as_bool()
        .ok_or_else(|| ConfigError::invalid_schema(at, "expected a boolean"))
}

/// Escapes one JSON Pointer segment (RFC 6901).
fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn child_path(parent: &str, key: &str) -> String {
    format!("{parent}/{}", escape_pointer(key))
}

fn violation(path: &str, keyword: &str, message: String, value: Option<Value>) -> Violation {
    Violation {
        path: path.to_string(),
        keyword: keyword.to_string(),
        message,
        value,
    }
}

impl Node {
    fn check(&self, defs: &[Node], value: Instance<'_>, path: &str, out: &mut Vec<Violation>) {
        if self.never {
            out.push(violation(
                path,
                "false",
                "no value is allowed here".to_string(),
                Some(value.to_value()),
            ));
            return;
        }

        if let Some(types) = &self.types {
            if !types.iter().any(|t| t.matches(value)) {
                let expected: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
                out.push(violation(
                    path,
                    "type",
                    format!("expected {}, found {}", expected.join(" or "), value.kind()),
                    Some(value.to_value()),
                ));
                // The remaining keywords describe a shape this value does not have.
                return;
            }
        }

        if let Some(target) = self.reference.and_then(|index| defs.get(index)) {
            target.check(defs, value, path, out);
        }

        if let Some(expected) = &self.const_value {
            if !value.equals(expected) {
                out.push(violation(
                    path,
                    "const",
                    format!("must equal {expected}"),
                    Some(value.to_value()),
                ));
            }
        }

        if let Some(allowed) = &self.enum_values {
            if !allowed.iter().any(|candidate| value.equals(candidate)) {
                let allowed: Vec<String> = allowed.iter().map(Value::to_string).collect();
                out.push(violation(
                    path,
                    "enum",
                    format!("must be one of {}", allowed.join(", ")),
                    Some(value.to_value()),
                ));
            }
        }

        self.check_composition(defs, value, path, out);

        match value {
            Instance::Object(map) => self.check_object(defs, map, path, out),
            Instance::Value(Value::Object(map)) => self.check_object(defs, map, path, out),
            Instance::Value(Value::Number(n)) => {
                if let Some(n) = n.as_f64() {
                    self.check_number(n, value, path, out);
                }
            }
            Instance::Value(Value::String(s)) => self.check_string(s, value, path, out),
            Instance::Value(Value::Array(items)) => self.check_array(defs, items, value, path, out),
            Instance::Value(Value::Null | Value::Bool(_)) => {}
        }
    }

    fn accepts(&self, defs: &[Node], value: Instance<'_>, path: &str) -> bool {
        let mut scratch = Vec::new();
        self.check(defs, value, path, &mut scratch);
        scratch.is_empty()
    }

    /// `anyOf`, `oneOf` and `not` report one violation for the keyword rather
    /// than the failures of each branch.
    fn check_composition(
        &self,
        defs: &[Node],
        value: Instance<'_>,
        path: &str,
        out: &mut Vec<Violation>,
    ) {
        for branch in &self.all_of {
            branch.check(defs, value, path, out);
        }

        if !self.any_of.is_empty() && !self.any_of.iter().any(|b| b.accepts(defs, value, path)) {
            out.push(violation(
                path,
                "anyOf",
                format!("must match at least one of {} schemas", self.any_of.len()),
                Some(value.to_value()),
            ));
        }

        if !self.one_of.is_empty() {
            let matched = self
                .one_of
                .iter()
                .filter(|b| b.accepts(defs, value, path))
                .count();
            if matched != 1 {
                out.push(violation(
                    path,
                    "oneOf",
                    format!(
                        "must match exactly one of {} schemas, matched {matched}",
                        self.one_of.len()
                    ),
                    Some(value.to_value()),
                ));
            }
        }

        if let Some(not) = &self.not {
            if not.accepts(defs, value, path) {
                out.push(violation(
                    path,
                    "not",
                    "must not match the schema in 'not'".to_string(),
                    Some(value.to_value()),
                ));
            }
        }

        if let Some(condition) = &self.condition {
            let branch = if condition.accepts(defs, value, path) {
                &self.then
            } else {
                &self.otherwise
            };
            if let Some(branch) = branch {
                branch.check(defs, value, path, out);
            }
        }
    }

    /// References applied to the same value, without descending into children.
    fn in_place_refs(&self, out: &mut Vec<usize>) {
        out.extend(self.reference);
        for branch in self.all_of.iter().chain(&self.any_of).chain(&self.one_of) {
            branch.in_place_refs(out);
        }
        for sub in [&self.not, &self.condition, &self.then, &self.otherwise]
            .into_iter()
            .flatten()
        {
            sub.in_place_refs(out);
        }
    }

    fn check_number(&self, n: f64, value: Instance<'_>, path: &str, out: &mut Vec<Violation>) {
        let mut fail = |keyword: &str, message: String| {
            out.push(violation(path, keyword, message, Some(value.to_value())));
        };
        if let Some(min) = self.minimum {
            if n < min {
                fail("minimum", format!("must be >= {min}"));
            }
        }
        if let Some(max) = self.maximum {
            if n > max {
                fail("maximum", format!("must be <= {max}"));
            }
        }
        if let Some(min) = self.exclusive_minimum {
            if n <= min {
                fail("exclusiveMinimum", format!("must be > {min}"));
            }
        }
        if let Some(max) = self.exclusive_maximum {
            if n >= max {
                fail("exclusiveMaximum", format!("must be < {max}"));
            }
        }
        if let Some(step) = self.multiple_of {
            let quotient = n / step;
            if (quotient - quotient.round()).abs() > f64::EPSILON * quotient.abs().max(1.0) {
                fail("multipleOf", format!("must be a multiple of {step}"));
            }
        }
    }

    fn check_string(&self, s: &str, value: Instance<'_>, path: &str, out: &mut Vec<Violation>) {
        let len = s.chars().count();
        if let Some(min) = self.min_length {
            if len < min {
                out.push(violation(
                    path,
                    "minLength",
                    format!("must be at least {min} characters"),
                    Some(value.to_value()),
                ));
            }
        }
        if let Some(max) = self.max_length {
            if len > max {
                out.push(violation(
                    path,
                    "maxLength",
                    format!("must be at most {max} characters"),
                    Some(value.to_value()),
                ));
            }
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(s) {
                out.push(violation(
                    path,
                    "pattern",
                    format!("must match /{}/", pattern.as_str()),
                    Some(value.to_value()),
                ));
            }
        }
        if let Some(format) = self.format {
            if !format.accepts(s) {
                out.push(violation(
                    path,
                    "format",
                    format!("must be a valid {format}"),
                    Some(value.to_value()),
                ));
            }
        }
    }

    fn check_array(
        &self,
        defs: &[Node],
        items: &[Value],
        value: Instance<'_>,
        path: &str,
        out: &mut Vec<Violation>,
    ) {
        if let Some(min) = self.min_items {
            if items.len() < min {
                out.push(violation(
                    path,
                    "minItems",
                    format!("must have at least {min} items"),
                    Some(value.to_value()),
                ));
            }
        }
        if let Some(max) = self.max_items {
            if items.len() > max {
                out.push(violation(
                    path,
                    "maxItems",
                    format!("must have at most {max} items"),
                    Some(value.to_value()),
                ));
            }
        }
        if self.unique_items {
            let duplicate = items
                .iter()
                .enumerate()
                .any(|(i, item)| items[..i].iter().any(|earlier| json_eq(earlier, item)));
            if duplicate {
                out.push(violation(
                    path,
                    "uniqueItems",
                    "items must be unique".to_string(),
                    Some(value.to_value()),
                ));
            }
        }
        if let Some(contains) = &self.contains {
            let found = items
                .iter()
                .enumerate()
                .any(|(i, item)| {
                    contains.accepts(defs, Instance::Value(item), &format!("{path}/{i}"))
                });
            if !found {
                out.push(violation(
                    path,
                    "contains",
                    "must contain at least one matching item".to_string(),
                    Some(value.to_value()),
                ));
            }
        }
        if let Some(schema) = &self.items {
            for (i, item) in items.iter().enumerate() {
                schema.check(defs, Instance::Value(item), &format!("{path}/{i}"), out);
            }
        }
    }

    fn check_object(
        &self,
        defs: &[Node],
        map: &Map<String, Value>,
        path: &str,
        out: &mut Vec<Violation>,
    ) {
        let count = map.len();
        if let Some(min) = self.min_properties {
            if count < min {
                out.push(violation(
                    path,
                    "minProperties",
                    format!("must have at least {min} properties"),
                    Some(Value::Object(map.clone())),
                ));
            }
        }
        if let Some(max) = self.max_properties {
            if count > max {
                out.push(violation(
                    path,
                    "maxProperties",
                    format!("must have at most {max} properties"),
                    Some(Value::Object(map.clone())),
                ));
            }
        }

        for name in &self.required {
            if !map.contains_key(name) {
                out.push(violation(
                    &child_path(path, name),
                    "required",
                    format!("missing required property '{name}'"),
                    None,
                ));
            }
        }

        for (trigger, needs) in &self.dependent_required {
            if !map.contains_key(trigger) {
                continue;
            }
            for name in needs.iter().filter(|name| !map.contains_key(*name)) {
                out.push(violation(
                    &child_path(path, name),
                    "dependentRequired",
                    format!("'{name}' is required when '{trigger}' is present"),
                    None,
                ));
            }
        }

        for (key, value) in map {
            let at = child_path(path, key);

            if let Some(names) = &self.property_names {
                let name = Value::String(key.clone());
                if !names.accepts(defs, Instance::Value(&name), &at) {
                    out.push(violation(
                        &at,
                        "propertyNames",
                        format!("property name '{key}' is not allowed"),
                        Some(name),
                    ));
                }
            }

            let mut known = false;
            if let Some((_, schema)) = self.properties.iter().find(|(name, _)| name == key) {
                known = true;
                schema.check(defs, Instance::Value(value), &at, out);
            }
            for (pattern, schema) in &self.pattern_properties {
                if pattern.is_match(key) {
                    known = true;
                    schema.check(defs, Instance::Value(value), &at, out);
                }
            }
            if known {
                continue;
            }

            match &self.additional {
                Additional::Allow => {}
                Additional::Deny => out.push(violation(
                    &at,
                    "additionalProperties",
                    format!("unknown property '{key}'"),
                    Some(value.clone()),
                )),
                Additional::Schema(schema) => schema.check(defs, Instance::Value(value), &at, out),
            }
        }
    }
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !s.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(head, tail)| !head.is_empty() && !tail.is_empty())
}

fn is_hostname(s: &str) -> bool {
    let s = s.strip_suffix('.').unwrap_or(s);
    !s.is_empty()
        && s.len() <= 253
        && s.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}
