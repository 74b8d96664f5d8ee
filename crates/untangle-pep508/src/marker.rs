//! Environment markers, such as `python_version >= "3.8" and extra == "socks"`.
//!
//! Markers are parsed into a typed [`MarkerTree`] and evaluated against a [`MarkerEnvironment`]
//! plus the set of requested extras. Nothing is evaluated dynamically.
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use tracing::warn;

use untangle_normalize::ExtraName;
use untangle_pep440::{Operator, Version, VersionSpecifier};

use crate::Pep508Error;
use crate::cursor::Cursor;

/// Markers whose value is a PEP 440 version, such as `python_version`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::enum_variant_names)]
pub enum MarkerValueVersion {
    ImplementationVersion,
    PythonFullVersion,
    PythonVersion,
}

impl Display for MarkerValueVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImplementationVersion => f.write_str("implementation_version"),
            Self::PythonFullVersion => f.write_str("python_full_version"),
            Self::PythonVersion => f.write_str("python_version"),
        }
    }
}

/// Markers whose value is an arbitrary string, such as `sys_platform`.
///
/// The dotted PEP 345 spellings (`os.name`, `sys.platform`, ...) parse to the same variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MarkerValueString {
    ImplementationName,
    OsName,
    PlatformMachine,
    PlatformPythonImplementation,
    PlatformRelease,
    PlatformSystem,
    PlatformVersion,
    SysPlatform,
}

impl Display for MarkerValueString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ImplementationName => "implementation_name",
            Self::OsName => "os_name",
            Self::PlatformMachine => "platform_machine",
            Self::PlatformPythonImplementation => "platform_python_implementation",
            Self::PlatformRelease => "platform_release",
            Self::PlatformSystem => "platform_system",
            Self::PlatformVersion => "platform_version",
            Self::SysPlatform => "sys_platform",
        })
    }
}

/// One side of a marker expression.
///
/// <https://packaging.python.org/en/latest/specifications/dependency-specifiers/#environment-markers>
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MarkerValue {
    MarkerEnvVersion(MarkerValueVersion),
    MarkerEnvString(MarkerValueString),
    /// `extra`, which comes from the requested extras rather than the environment.
    Extra,
    /// A quoted string such as `'3.8'` or `"win32"`.
    QuotedString(String),
}

impl FromStr for MarkerValue {
    type Err = String;

    /// Parses the reserved (unquoted) marker names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s {
            "implementation_name" => Self::MarkerEnvString(MarkerValueString::ImplementationName),
            "implementation_version" => {
                Self::MarkerEnvVersion(MarkerValueVersion::ImplementationVersion)
            }
            "os_name" | "os.name" => Self::MarkerEnvString(MarkerValueString::OsName),
            "platform_machine" | "platform.machine" => {
                Self::MarkerEnvString(MarkerValueString::PlatformMachine)
            }
            "platform_python_implementation" | "platform.python_implementation" => {
                Self::MarkerEnvString(MarkerValueString::PlatformPythonImplementation)
            }
            "platform_release" => Self::MarkerEnvString(MarkerValueString::PlatformRelease),
            "platform_system" => Self::MarkerEnvString(MarkerValueString::PlatformSystem),
            "platform_version" | "platform.version" => {
                Self::MarkerEnvString(MarkerValueString::PlatformVersion)
            }
            "python_full_version" => Self::MarkerEnvVersion(MarkerValueVersion::PythonFullVersion),
            "python_version" => Self::MarkerEnvVersion(MarkerValueVersion::PythonVersion),
            "sys_platform" | "sys.platform" => {
                Self::MarkerEnvString(MarkerValueString::SysPlatform)
            }
            "extra" => Self::Extra,
            _ => return Err(format!("Invalid key: {s}")),
        };
        Ok(value)
    }
}

impl Display for MarkerValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarkerEnvVersion(key) => key.fmt(f),
            Self::MarkerEnvString(key) => key.fmt(f),
            Self::Extra => f.write_str("extra"),
            Self::QuotedString(value) => write!(f, "'{value}'"),
        }
    }
}

/// How to compare key and value, such as by `==`, `>` or `not in`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MarkerOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    TildeEqual,
    In,
    NotIn,
}

impl MarkerOperator {
    /// The version comparison for this operator; `None` for `in` and `not in`.
    fn to_pep440_operator(self) -> Option<Operator> {
        match self {
            Self::Equal => Some(Operator::Equal),
            Self::NotEqual => Some(Operator::NotEqual),
            Self::GreaterThan => Some(Operator::GreaterThan),
            Self::GreaterEqual => Some(Operator::GreaterThanEqual),
            Self::LessThan => Some(Operator::LessThan),
            Self::LessEqual => Some(Operator::LessThanEqual),
            Self::TildeEqual => Some(Operator::TildeEqual),
            Self::In | Self::NotIn => None,
        }
    }
}

impl FromStr for MarkerOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "==" => Self::Equal,
            "!=" => Self::NotEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessEqual,
            "~=" => Self::TildeEqual,
            "in" => Self::In,
            other => return Err(format!("Invalid comparator: {other}")),
        })
    }
}

impl Display for MarkerOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterEqual => ">=",
            Self::LessThan => "<",
            Self::LessEqual => "<=",
            Self::TildeEqual => "~=",
            Self::In => "in",
            Self::NotIn => "not in",
        })
    }
}

/// A [`Version`] together with the text it was parsed from.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StringVersion {
    pub string: String,
    pub version: Version,
}

impl FromStr for StringVersion {
    type Err = untangle_pep440::VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            string: s.to_string(),
            version: Version::from_str(s)?,
        })
    }
}

impl Display for StringVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.string)
    }
}

impl Serialize for StringVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.string)
    }
}

impl<'de> Deserialize<'de> for StringVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        Self::from_str(&string).map_err(de::Error::custom)
    }
}

/// The marker values of a Python interpreter.
///
/// <https://packaging.python.org/en/latest/specifications/dependency-specifiers/#environment-markers>
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct MarkerEnvironment {
    pub implementation_name: String,
    pub implementation_version: StringVersion,
    pub os_name: String,
    pub platform_machine: String,
    pub platform_python_implementation: String,
    pub platform_release: String,
    pub platform_system: String,
    pub platform_version: String,
    pub python_full_version: StringVersion,
    pub python_version: StringVersion,
    pub sys_platform: String,
}

impl MarkerEnvironment {
    /// A CPython environment for the given interpreter version on the host operating system,
    /// for when no interpreter can be queried.
    ///
    /// `platform_release` and `platform_version` are unknown and left empty.
    pub fn from_host(python_full_version: &Version) -> Self {
        let release = python_full_version.release();
        let major = release.first().copied().unwrap_or(3);
        let minor = release.get(1).copied().unwrap_or(0);
        let python_version = Version::new([major, minor]);

        let (os_name, platform_system, sys_platform) = match std::env::consts::OS {
            "linux" => ("posix", "Linux", "linux"),
            "macos" => ("posix", "Darwin", "darwin"),
            "windows" => ("nt", "Windows", "win32"),
            "freebsd" => ("posix", "FreeBSD", "freebsd"),
            other => ("posix", other, other),
        };
        let platform_machine = match (std::env::consts::OS, std::env::consts::ARCH) {
            ("macos", "aarch64") => "arm64",
            ("windows", "x86_64") => "AMD64",
            (_, arch) => arch,
        };

        Self {
            implementation_name: "cpython".to_string(),
            implementation_version: StringVersion {
                string: python_full_version.to_string(),
                version: python_full_version.clone(),
            },
            os_name: os_name.to_string(),
            platform_machine: platform_machine.to_string(),
            platform_python_implementation: "CPython".to_string(),
            platform_release: String::new(),
            platform_system: platform_system.to_string(),
            platform_version: String::new(),
            python_full_version: StringVersion {
                string: python_full_version.to_string(),
                version: python_full_version.clone(),
            },
            python_version: StringVersion {
                string: python_version.to_string(),
                version: python_version,
            },
            sys_platform: sys_platform.to_string(),
        }
    }

    fn get_version(&self, key: MarkerValueVersion) -> &Version {
        match key {
            MarkerValueVersion::ImplementationVersion => &self.implementation_version.version,
            MarkerValueVersion::PythonFullVersion => &self.python_full_version.version,
            MarkerValueVersion::PythonVersion => &self.python_version.version,
        }
    }

    fn get_string(&self, key: MarkerValueString) -> &str {
        match key {
            MarkerValueString::ImplementationName => &self.implementation_name,
            MarkerValueString::OsName => &self.os_name,
            MarkerValueString::PlatformMachine => &self.platform_machine,
            MarkerValueString::PlatformPythonImplementation => {
                &self.platform_python_implementation
            }
            MarkerValueString::PlatformRelease => &self.platform_release,
            MarkerValueString::PlatformSystem => &self.platform_system,
            MarkerValueString::PlatformVersion => &self.platform_version,
            MarkerValueString::SysPlatform => &self.sys_platform,
        }
    }
}

/// A single `<value> <op> <value>` comparison, such as `python_version >= "3.8"`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MarkerExpression {
    pub l_value: MarkerValue,
    pub operator: MarkerOperator,
    pub r_value: MarkerValue,
}

impl MarkerExpression {
    /// Evaluate the expression. Nonsensical comparisons log a warning and evaluate to `false`.
    fn evaluate(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        match (&self.l_value, &self.r_value) {
            // `<version key> <op> '<version>'`
            (MarkerValue::MarkerEnvVersion(l_key), MarkerValue::QuotedString(r_string)) => {
                let Some(specifier) = self.specifier(r_string) else {
                    return false;
                };
                specifier.contains(env.get_version(*l_key))
            }
            // `'<version>' <op> <version key>`
            (MarkerValue::QuotedString(l_string), MarkerValue::MarkerEnvVersion(r_key)) => {
                let Ok(l_version) = Version::from_str(l_string) else {
                    warn!("Expected PEP 440 version in `{self}`, evaluating to false");
                    return false;
                };
                let Some(operator) = self.operator.to_pep440_operator() else {
                    warn!("Expected a version operator in `{self}`, evaluating to false");
                    return false;
                };
                match VersionSpecifier::new(operator, env.get_version(*r_key).clone(), false) {
                    Ok(specifier) => specifier.contains(&l_version),
                    Err(err) => {
                        warn!("Invalid operator/version combination in `{self}`: {err}");
                        false
                    }
                }
            }
            (MarkerValue::MarkerEnvString(l_key), MarkerValue::QuotedString(r_string)) => {
                self.compare_strings(env.get_string(*l_key), r_string)
            }
            (MarkerValue::QuotedString(l_string), MarkerValue::MarkerEnvString(r_key)) => {
                self.compare_strings(l_string, env.get_string(*r_key))
            }
            // `extra == '...'` and `'...' == extra`
            (MarkerValue::Extra, MarkerValue::QuotedString(value))
            | (MarkerValue::QuotedString(value), MarkerValue::Extra) => {
                match ExtraName::from_str(value) {
                    Ok(extra) => self.compare_extra(&extra, extras),
                    Err(err) => {
                        warn!("Expected extra name in `{self}`, evaluating to false: {err}");
                        false
                    }
                }
            }
            _ => {
                warn!("Comparing `{self}` doesn't make sense, evaluating to false");
                false
            }
        }
    }

    /// The specifier `<op> '<version>'` for a version key on the left, allowing `.*` wildcards.
    fn specifier(&self, r_string: &str) -> Option<VersionSpecifier> {
        let (version, wildcard) = match Version::parse_pattern(r_string) {
            Ok(pattern) => pattern,
            Err(err) => {
                warn!("Expected PEP 440 version in `{self}`, evaluating to false: {err}");
                return None;
            }
        };
        let Some(operator) = self.operator.to_pep440_operator() else {
            warn!("Expected a version operator in `{self}`, evaluating to false");
            return None;
        };
        match VersionSpecifier::new(operator, version, wildcard) {
            Ok(specifier) => Some(specifier),
            Err(err) => {
                warn!("Invalid operator/version combination in `{self}`: {err}");
                None
            }
        }
    }

    /// Compare strings by PEP 508 logic.
    fn compare_strings(&self, l_string: &str, r_string: &str) -> bool {
        match self.operator {
            MarkerOperator::Equal => l_string == r_string,
            MarkerOperator::NotEqual => l_string != r_string,
            MarkerOperator::GreaterThan => l_string > r_string,
            MarkerOperator::GreaterEqual => l_string >= r_string,
            MarkerOperator::LessThan => l_string < r_string,
            MarkerOperator::LessEqual => l_string <= r_string,
            MarkerOperator::TildeEqual => {
                warn!("Can't compare {l_string} and {r_string} with `~=`, evaluating to false");
                false
            }
            MarkerOperator::In => r_string.contains(l_string),
            MarkerOperator::NotIn => !r_string.contains(l_string),
        }
    }

    fn compare_extra(&self, extra: &ExtraName, extras: &[ExtraName]) -> bool {
        match self.operator {
            MarkerOperator::Equal => extras.contains(extra),
            MarkerOperator::NotEqual => !extras.contains(extra),
            _ => {
                warn!("Comparing extra with anything but `==` or `!=` in `{self}`, evaluating to false");
                false
            }
        }
    }
}

impl Display for MarkerExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.l_value, self.operator, self.r_value)
    }
}

/// A marker expression with `and`, `or` and parentheses.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MarkerTree {
    /// A simple expression such as `python_version > "3.8"`
    Expression(MarkerExpression),
    /// All of the nested markers must hold.
    And(Vec<MarkerTree>),
    /// Any of the nested markers must hold.
    Or(Vec<MarkerTree>),
}

impl MarkerTree {
    /// Does this marker apply in the given environment with the given extras requested?
    pub fn evaluate(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        match self {
            Self::Expression(expression) => expression.evaluate(env, extras),
            Self::And(markers) => markers.iter().all(|marker| marker.evaluate(env, extras)),
            Self::Or(markers) => markers.iter().any(|marker| marker.evaluate(env, extras)),
        }
    }
}

impl FromStr for MarkerTree {
    type Err = Pep508Error;

    fn from_str(markers: &str) -> Result<Self, Self::Err> {
        let mut cursor = Cursor::new(markers);
        parse_markers_cursor(&mut cursor)
    }
}

impl Display for MarkerTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (markers, separator) = match self {
            Self::Expression(expression) => return write!(f, "{expression}"),
            Self::And(markers) => (markers, " and "),
            Self::Or(markers) => (markers, " or "),
        };
        for (idx, marker) in markers.iter().enumerate() {
            if idx > 0 {
                f.write_str(separator)?;
            }
            if matches!(marker, Self::Expression(_)) {
                write!(f, "{marker}")?;
            } else {
                write!(f, "({marker})")?;
            }
        }
        Ok(())
    }
}

/// ```text
/// version_cmp   = wsp* <'<=' | '<' | '!=' | '==' | '>=' | '>' | '~=' | '==='>
/// marker_op     = version_cmp | (wsp* 'in') | (wsp* 'not' wsp+ 'in')
/// ```
fn parse_marker_operator(cursor: &mut Cursor) -> Result<MarkerOperator, Pep508Error> {
    let (start, len) =
        cursor.take_while(|char| !char.is_whitespace() && char != '\'' && char != '"');
    let operator = cursor.slice(start, len);
    if operator == "not" {
        // 'not' wsp+ 'in'
        match cursor.next() {
            None => {
                return Err(cursor.error(
                    "Expected whitespace after 'not', found end of input",
                    cursor.pos(),
                    1,
                ));
            }
            Some((_, whitespace)) if whitespace.is_whitespace() => {}
            Some((pos, other)) => {
                return Err(cursor.error(
                    format!("Expected whitespace after 'not', found '{other}'"),
                    pos,
                    other.len_utf8(),
                ));
            }
        }
        cursor.eat_whitespace();
        cursor.next_expect_char('i', cursor.pos())?;
        cursor.next_expect_char('n', cursor.pos())?;
        return Ok(MarkerOperator::NotIn);
    }
    MarkerOperator::from_str(operator).map_err(|_| {
        cursor.error(
            format!(
                "Expected a valid marker operator (such as '>=' or 'not in'), found '{operator}'"
            ),
            start,
            len,
        )
    })
}

/// Either a single or double quoted string or one of the reserved marker names.
fn parse_marker_value(cursor: &mut Cursor) -> Result<MarkerValue, Pep508Error> {
    match cursor.peek() {
        None => Err(cursor.error(
            "Expected marker value, found end of dependency specification",
            cursor.pos(),
            1,
        )),
        Some((start_pos, quotation_mark @ ('"' | '\''))) => {
            cursor.next();
            let (start, len) = cursor.take_while(|c| c != quotation_mark);
            let value = cursor.slice(start, len).to_string();
            cursor.next_expect_char(quotation_mark, start_pos)?;
            Ok(MarkerValue::QuotedString(value))
        }
        Some(_) => {
            let (start, len) = cursor.take_while(|char| {
                !char.is_whitespace() && !['>', '=', '<', '!', '~', ')'].contains(&char)
            });
            let key = cursor.slice(start, len);
            MarkerValue::from_str(key).map_err(|_| {
                cursor.error(
                    format!("Expected a valid marker name, found '{key}'"),
                    start,
                    len,
                )
            })
        }
    }
}

/// ```text
/// marker_var:l marker_op:o marker_var:r
/// ```
fn parse_marker_key_op_value(cursor: &mut Cursor) -> Result<MarkerExpression, Pep508Error> {
    cursor.eat_whitespace();
    let l_value = parse_marker_value(cursor)?;
    cursor.eat_whitespace();
    let operator = parse_marker_operator(cursor)?;
    cursor.eat_whitespace();
    let r_value = parse_marker_value(cursor)?;
    Ok(MarkerExpression {
        l_value,
        operator,
        r_value,
    })
}

/// ```text
/// marker_expr   = marker_var:l marker_op:o marker_var:r -> (o, l, r)
///               | wsp* '(' marker:m wsp* ')' -> m
/// ```
fn parse_marker_expr(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    cursor.eat_whitespace();
    if let Some(start_pos) = cursor.eat_char('(') {
        let marker = parse_marker_or(cursor)?;
        cursor.eat_whitespace();
        cursor.next_expect_char(')', start_pos)?;
        Ok(marker)
    } else {
        Ok(MarkerTree::Expression(parse_marker_key_op_value(cursor)?))
    }
}

/// ```text
/// marker_and    = marker_expr:l wsp* 'and' marker_expr:r -> ('and', l, r)
///               | marker_expr:m -> m
/// ```
fn parse_marker_and(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    parse_marker_op(cursor, "and", MarkerTree::And, parse_marker_expr)
}

/// ```text
/// marker_or     = marker_and:l wsp* 'or' marker_and:r -> ('or', l, r)
///               | marker_and:m -> m
/// ```
fn parse_marker_or(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    parse_marker_op(cursor, "or", MarkerTree::Or, parse_marker_and)
}

/// Parses both `marker_and` and `marker_or`.
fn parse_marker_op(
    cursor: &mut Cursor,
    op: &str,
    op_constructor: fn(Vec<MarkerTree>) -> MarkerTree,
    parse_inner: fn(&mut Cursor) -> Result<MarkerTree, Pep508Error>,
) -> Result<MarkerTree, Pep508Error> {
    let mut expressions = vec![parse_inner(cursor)?];
    loop {
        cursor.eat_whitespace();
        let (start, len) = cursor.peek_while(|c| !c.is_whitespace() && c != '(');
        if cursor.slice(start, len) == op {
            cursor.take_while(|c| !c.is_whitespace() && c != '(');
            expressions.push(parse_inner(cursor)?);
        } else if expressions.len() == 1 {
            return Ok(expressions.remove(0));
        } else {
            return Ok(op_constructor(expressions));
        }
    }
}

/// ```text
/// marker        = marker_or
/// ```
pub(crate) fn parse_markers_cursor(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    let marker = parse_marker_or(cursor)?;
    cursor.eat_whitespace();
    if let Some((pos, unexpected)) = cursor.next() {
        // Neither `and` nor `or` followed the last expression.
        return Err(cursor.error(
            format!("Unexpected character '{unexpected}', expected 'and', 'or' or end of input"),
            pos,
            cursor.remaining() + unexpected.len_utf8(),
        ));
    }
    Ok(marker)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use indoc::indoc;
    use insta::assert_snapshot;
    use test_case::test_case;

    use untangle_normalize::ExtraName;
    use untangle_pep440::Version;

    use super::{MarkerEnvironment, MarkerTree};

    fn env312() -> MarkerEnvironment {
        let mut env = MarkerEnvironment::from_host(&Version::from_str("3.12.1").unwrap());
        env.sys_platform = "linux".to_string();
        env.os_name = "posix".to_string();
        env.platform_system = "Linux".to_string();
        env
    }

    fn extras(names: &[&str]) -> Vec<ExtraName> {
        names
            .iter()
            .map(|name| ExtraName::from_str(name).unwrap())
            .collect()
    }

    #[test_case(r#"python_version >= "3.8""#, &[], true)]
    #[test_case(r#"python_version < "3.8""#, &[], false)]
    #[test_case(r#"python_version == "3.*""#, &[], true)]
    #[test_case(r#"'3.13' > python_version"#, &[], true)]
    #[test_case(r#"python_full_version >= "3.12.1""#, &[], true)]
    #[test_case(r#"sys_platform == "win32""#, &[], false)]
    #[test_case(r#"sys.platform == "linux""#, &[], true)]
    #[test_case(r#""linux" in sys_platform"#, &[], true)]
    #[test_case(r#"os_name not in "nt java""#, &[], true)]
    #[test_case(r#"extra == "socks""#, &[], false)]
    #[test_case(r#"extra == "socks""#, &["socks"], true)]
    #[test_case(r#"extra == "Use_Chardet-On.Py3""#, &["use-chardet-on-py3"], true)]
    #[test_case(r#""socks" == extra"#, &["socks"], true)]
    #[test_case(r#"extra != "socks""#, &[], true)]
    #[test_case(r#"python_version >= "3.8" and extra == "socks""#, &["socks"], true)]
    #[test_case(r#"(python_version < "3.8" or sys_platform == "linux") and extra == "socks""#, &["socks"], true)]
    #[test_case(r#"python_version < "3.8" or (sys_platform == "linux" and extra == "socks")"#, &[], false)]
    fn evaluate(marker: &str, requested: &[&str], expected: bool) {
        let marker = MarkerTree::from_str(marker).unwrap();
        assert_eq!(marker.evaluate(&env312(), &extras(requested)), expected);
    }

    #[test]
    fn nonsense_is_false() {
        let marker = MarkerTree::from_str(r#"extra > "socks""#).unwrap();
        assert!(!marker.evaluate(&env312(), &extras(&["socks"])));
        let marker = MarkerTree::from_str(r#"python_version == "three""#).unwrap();
        assert!(!marker.evaluate(&env312(), &[]));
    }

    #[test]
    fn display() {
        let marker = MarkerTree::from_str(
            r#"python_version=="3.10" and (sys_platform=="win32" or (os_name=="linux" and implementation_name=='cpython'))"#,
        )
        .unwrap();
        assert_snapshot!(
            marker,
            @"python_version == '3.10' and (sys_platform == 'win32' or (os_name == 'linux' and implementation_name == 'cpython'))"
        );
    }

    #[test]
    fn closing_parentheses() {
        let err = MarkerTree::from_str(r#"( "linux" in sys_platform"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            indoc! {r#"
                Expected ')', found end of dependency specification
                ( "linux" in sys_platform
                ^"#
            }
        );
    }

    #[test]
    fn trailing_garbage() {
        let err = MarkerTree::from_str(r#"python_version == "3.8" also"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            indoc! {r#"
                Unexpected character 'a', expected 'and', 'or' or end of input
                python_version == "3.8" also
                                        ^^^^"#
            }
        );
    }

    #[test]
    fn environment_from_json() {
        let env: MarkerEnvironment = serde_json::from_str(
            r##"{
                "implementation_name": "cpython",
                "implementation_version": "3.7.13",
                "os_name": "posix",
                "platform_machine": "x86_64",
                "platform_python_implementation": "CPython",
                "platform_release": "5.4.188+",
                "platform_system": "Linux",
                "platform_version": "#1 SMP Sun Apr 24 10:03:06 PDT 2022",
                "python_full_version": "3.7.13",
                "python_version": "3.7",
                "sys_platform": "linux"
            }"##,
        )
        .unwrap();
        assert_eq!(env.python_version.version, Version::new([3, 7]));
        let marker = MarkerTree::from_str(r#"python_version < "3.8""#).unwrap();
        assert!(marker.evaluate(&env, &[]));
    }
}
