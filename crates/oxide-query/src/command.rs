//! Token-based command building.
//!
//! Statements are accumulated as an ordered stream of [`Token`]s. Nothing
//! is numbered while building: [`CommandBuilder::finalize`] collects every
//! parameter token in one pass, assigns indices in a second pass over an
//! immutable view of the stream, and renders the final text with the
//! dialect's placeholder syntax.
//!
//! Index assignment:
//!
//! - constants are numbered first, in stream order, then deferred
//!   parameters by slot number;
//! - if the dialect binds arrays natively, arrays share the scalar index
//!   space;
//! - otherwise arrays get their own zero-based space and are expanded into
//!   one placeholder per element when the statement is bound, numbered
//!   after every scalar.

use std::borrow::Cow;

use crate::dialect::{Dialect, PlaceholderStyle};
use crate::error::CompileError;
use crate::value::SqlValue;

/// An atomic unit of a not-yet-rendered command.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Text(String),
    Param(Parameter),
    /// A list separator, rendered as `,`.
    Separator,
}

/// A parameter token.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    /// A value known at build time.
    Constant(SqlValue),
    /// The n-th execution-time argument.
    Deferred(usize),
}

impl Parameter {
    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Constant(SqlValue::Array(_)))
    }
}

/// An ordered token run, spliced into a larger command.
pub type Fragment = Vec<Token>;

/// Accumulates tokens for one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandBuilder {
    tokens: Vec<Token>,
}

impl CommandBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    pub fn text(&mut self, text: impl Into<String>) -> &mut Self {
        self.tokens.push(Token::Text(text.into()));
        self
    }

    pub fn param(&mut self, value: SqlValue) -> &mut Self {
        self.tokens.push(Token::Param(Parameter::Constant(value)));
        self
    }

    pub fn deferred(&mut self, slot: usize) -> &mut Self {
        self.tokens.push(Token::Param(Parameter::Deferred(slot)));
        self
    }

    pub fn separator(&mut self) -> &mut Self {
        self.tokens.push(Token::Separator);
        self
    }

    pub fn extend(&mut self, fragment: impl IntoIterator<Item = Token>) -> &mut Self {
        self.tokens.extend(fragment);
        self
    }

    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    #[must_use]
    pub fn into_tokens(self) -> Fragment {
        self.tokens
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// True when the builder holds exactly one `NULL` constant.
    #[must_use]
    pub fn is_null_literal(&self) -> bool {
        matches!(
            self.tokens.as_slice(),
            [Token::Param(Parameter::Constant(SqlValue::Null))]
        )
    }

    /// Resolves parameter indices and renders the final command.
    #[must_use]
    pub fn finalize(&self, dialect: &dyn Dialect) -> PreparedOperation {
        Resolution::collect(&self.tokens, dialect.supports_array_parameters())
            .render(dialect.placeholder_style())
    }

    /// Renders the command with constants inlined as literals.
    ///
    /// Used where the database does not accept parameters, such as view
    /// bodies and column defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Unsupported`] if the stream contains a
    /// deferred parameter.
    pub fn render_inline(&self, dialect: &dyn Dialect) -> Result<String, CompileError> {
        let mut out = TextWriter::default();
        for token in &self.tokens {
            match token {
                Token::Text(text) => out.word(text),
                Token::Separator => out.separator(),
                Token::Param(Parameter::Constant(value)) => out.word(&dialect.literal(value)),
                Token::Param(Parameter::Deferred(_)) => {
                    return Err(CompileError::unsupported(
                        "deferred parameter in an inline-rendered statement",
                    ));
                }
            }
        }
        Ok(out.finish())
    }
}

/// A token after index resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot<'t> {
    Text(&'t str),
    Separator,
    /// 1-based placeholder index.
    Scalar(usize),
    /// 0-based array index, expanded at bind time.
    Array(usize),
}

/// Result of the two-pass parameter resolution.
struct Resolution<'t> {
    slots: Vec<Slot<'t>>,
    constants: Vec<SqlValue>,
    arrays: Vec<Vec<SqlValue>>,
    deferred: usize,
}

impl<'t> Resolution<'t> {
    fn collect(tokens: &'t [Token], native_arrays: bool) -> Self {
        // Pass 1: gather constants and the deferred slot count.
        let mut constants = Vec::new();
        let mut arrays = Vec::new();
        let mut deferred = 0;
        for token in tokens {
            match token {
                Token::Param(Parameter::Constant(SqlValue::Array(items))) if !native_arrays => {
                    arrays.push(items.clone());
                }
                Token::Param(Parameter::Constant(value)) => constants.push(value.clone()),
                Token::Param(Parameter::Deferred(slot)) => deferred = deferred.max(slot + 1),
                Token::Text(_) | Token::Separator => {}
            }
        }

        // Pass 2: assign indices in stream order.
        let mut next_constant = 0;
        let mut next_array = 0;
        let slots = tokens
            .iter()
            .map(|token| match token {
                Token::Text(text) => Slot::Text(text),
                Token::Separator => Slot::Separator,
                Token::Param(Parameter::Constant(SqlValue::Array(_))) if !native_arrays => {
                    next_array += 1;
                    Slot::Array(next_array - 1)
                }
                Token::Param(Parameter::Constant(_)) => {
                    next_constant += 1;
                    Slot::Scalar(next_constant)
                }
                Token::Param(Parameter::Deferred(slot)) => Slot::Scalar(constants.len() + slot + 1),
            })
            .collect();

        Self {
            slots,
            constants,
            arrays,
            deferred,
        }
    }

    fn render(self, style: PlaceholderStyle) -> PreparedOperation {
        let mut segments = Vec::new();
        let mut out = TextWriter::default();
        for slot in &self.slots {
            match *slot {
                Slot::Text(text) => out.word(text),
                Slot::Separator => out.separator(),
                Slot::Scalar(index) => out.word(&style.render(index)),
                Slot::Array(index) => {
                    out.pending_space();
                    segments.push(Segment::Text(out.take()));
                    segments.push(Segment::Array(index));
                }
            }
        }

        if self.arrays.is_empty() {
            return PreparedOperation::Static(Prepared {
                text: out.finish(),
                constants: self.constants,
                deferred: self.deferred,
            });
        }
        segments.push(Segment::Text(out.finish()));
        PreparedOperation::Array(ArrayPrepared {
            segments,
            scalars: self.constants,
            arrays: self.arrays,
            deferred: self.deferred,
            style,
        })
    }
}

/// Joins words with single spaces; separators attach to the previous word.
#[derive(Default)]
struct TextWriter {
    text: String,
    /// A space is owed before the next word.
    owes_space: bool,
}

impl TextWriter {
    fn word(&mut self, word: &str) {
        if self.owes_space || (!self.text.is_empty() && !self.text.ends_with(' ')) {
            self.text.push(' ');
        }
        self.owes_space = false;
        self.text.push_str(word);
    }

    fn separator(&mut self) {
        self.text.push(',');
        self.owes_space = false;
    }

    /// Emits the space owed before an array expansion.
    fn pending_space(&mut self) {
        if !self.text.is_empty() {
            self.text.push(' ');
        }
    }

    fn take(&mut self) -> String {
        self.owes_space = true;
        std::mem::take(&mut self.text)
    }

    fn finish(self) -> String {
        self.text
    }
}

/// A finalized, immutable command.
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedOperation {
    /// Fixed text; cacheable at the physical-statement level.
    Static(Prepared),
    /// Text whose placeholders depend on array lengths.
    Array(ArrayPrepared),
}

impl PreparedOperation {
    /// The command text. For the array variant, arrays are shown expanded
    /// for their current lengths.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Self::Static(p) => Cow::Borrowed(&p.text),
            Self::Array(a) => Cow::Owned(a.expand_text()),
        }
    }

    /// Scalar constants, in index order.
    #[must_use]
    pub fn constants(&self) -> &[SqlValue] {
        match self {
            Self::Static(p) => &p.constants,
            Self::Array(a) => &a.scalars,
        }
    }

    /// Number of execution-time arguments expected by [`Self::bind`].
    #[must_use]
    pub const fn deferred_count(&self) -> usize {
        match self {
            Self::Static(p) => p.deferred,
            Self::Array(a) => a.deferred,
        }
    }

    #[must_use]
    pub const fn is_cacheable(&self) -> bool {
        matches!(self, Self::Static(_))
    }

    /// Produces an executable statement, appending `args` after the
    /// constants.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::ParameterCount`] if `args` does not match
    /// the number of deferred slots.
    pub fn bind(&self, args: &[SqlValue]) -> Result<Statement, CompileError> {
        let expected = self.deferred_count();
        if args.len() != expected {
            return Err(CompileError::ParameterCount {
                expected,
                actual: args.len(),
            });
        }
        Ok(match self {
            Self::Static(p) => Statement {
                text: p.text.clone(),
                params: p.constants.iter().chain(args).cloned().collect(),
            },
            Self::Array(a) => a.bind(args),
        })
    }

    /// Shorthand for [`Self::bind`] with no deferred arguments.
    ///
    /// # Errors
    ///
    /// See [`Self::bind`].
    pub fn statement(&self) -> Result<Statement, CompileError> {
        self.bind(&[])
    }
}

/// The fixed-text variant of a prepared operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    text: String,
    constants: Vec<SqlValue>,
    deferred: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Array(usize),
}

/// The array-expanding variant of a prepared operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayPrepared {
    segments: Vec<Segment>,
    scalars: Vec<SqlValue>,
    arrays: Vec<Vec<SqlValue>>,
    deferred: usize,
    style: PlaceholderStyle,
}

impl ArrayPrepared {
    fn bind(&self, args: &[SqlValue]) -> Statement {
        let mut params: Vec<SqlValue> = self.scalars.iter().chain(args).cloned().collect();
        let mut next = params.len() + 1;
        let mut text = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => text.push_str(t),
                Segment::Array(index) => {
                    let items = &self.arrays[*index];
                    if items.is_empty() {
                        text.push_str("NULL");
                        continue;
                    }
                    let placeholders: Vec<String> = (next..next + items.len())
                        .map(|i| self.style.render(i))
                        .collect();
                    text.push_str(&placeholders.join(", "));
                    next += items.len();
                    params.extend(items.iter().cloned());
                }
            }
        }
        Statement { text, params }
    }

    fn expand_text(&self) -> String {
        let args = vec![SqlValue::Null; self.deferred];
        self.bind(&args).text
    }
}

/// A command ready for the connection provider: final text plus every
/// parameter value in index order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: Vec<SqlValue>) -> Self {
        self.params = params;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqlServerDialect, SqliteDialect};

    fn ints(values: &[i64]) -> SqlValue {
        SqlValue::Array(values.iter().copied().map(SqlValue::Int).collect())
    }

    #[test]
    fn test_constants_numbered_in_order() {
        let mut b = CommandBuilder::new();
        b.text("[a] =").param(SqlValue::Int(1));
        b.text("AND [b] =").param(SqlValue::Int(2));
        let prepared = b.finalize(&SqlServerDialect::new());
        assert_eq!(prepared.text(), "[a] = @1 AND [b] = @2");
        assert_eq!(prepared.constants(), &[SqlValue::Int(1), SqlValue::Int(2)]);
        assert!(prepared.is_cacheable());
    }

    #[test]
    fn test_deferred_follow_constants() {
        let mut b = CommandBuilder::new();
        b.text("a =").deferred(0);
        b.text("AND b =").param(SqlValue::Int(9));
        b.text("AND c =").deferred(1);
        let prepared = b.finalize(&SqliteDialect::new());
        assert_eq!(prepared.text(), "a = ?2 AND b = ?1 AND c = ?3");
        assert_eq!(prepared.deferred_count(), 2);

        let stmt = prepared
            .bind(&[SqlValue::Text(String::from("x")), SqlValue::Int(3)])
            .unwrap();
        assert_eq!(
            stmt.params,
            vec![
                SqlValue::Int(9),
                SqlValue::Text(String::from("x")),
                SqlValue::Int(3)
            ]
        );
    }

    #[test]
    fn test_bind_checks_argument_count() {
        let mut b = CommandBuilder::new();
        b.text("a =").deferred(0);
        let prepared = b.finalize(&SqliteDialect::new());
        assert!(matches!(
            prepared.bind(&[]),
            Err(CompileError::ParameterCount {
                expected: 1,
                actual: 0
            })
        ));
    }

    #[test]
    fn test_separator_attaches_to_previous_word() {
        let mut b = CommandBuilder::new();
        b.text("IN (").param(SqlValue::Int(1)).separator().param(SqlValue::Int(2));
        b.text(")");
        let prepared = b.finalize(&SqliteDialect::new());
        assert_eq!(prepared.text(), "IN ( ?1, ?2 )");
    }

    #[test]
    fn test_native_arrays_share_index_space() {
        let mut b = CommandBuilder::new();
        b.text("a =").param(SqlValue::Int(1));
        b.text("AND b = ANY(").param(ints(&[1, 2])).text(")");
        b.text("AND c =").param(SqlValue::Int(3));
        let prepared = b.finalize(&PostgresDialect::new());
        assert!(prepared.is_cacheable());
        assert_eq!(prepared.text(), "a = $1 AND b = ANY( $2 ) AND c = $3");
        assert_eq!(prepared.constants().len(), 3);
    }

    #[test]
    fn test_arrays_expand_after_scalars() {
        let mut b = CommandBuilder::new();
        b.text("a IN (").param(ints(&[7, 8, 9])).text(")");
        b.text("AND c =").param(SqlValue::Int(3));
        b.text("AND d =").deferred(0);
        let prepared = b.finalize(&SqlServerDialect::new());
        assert!(!prepared.is_cacheable());
        assert_eq!(prepared.constants(), &[SqlValue::Int(3)]);

        let stmt = prepared.bind(&[SqlValue::Int(4)]).unwrap();
        assert_eq!(stmt.text, "a IN ( @3, @4, @5 ) AND c = @1 AND d = @2");
        assert_eq!(
            stmt.params,
            vec![
                SqlValue::Int(3),
                SqlValue::Int(4),
                SqlValue::Int(7),
                SqlValue::Int(8),
                SqlValue::Int(9)
            ]
        );
    }

    #[test]
    fn test_empty_array_expands_to_null() {
        let mut b = CommandBuilder::new();
        b.text("a IN (").param(ints(&[])).text(")");
        let stmt = b.finalize(&SqliteDialect::new()).statement().unwrap();
        assert_eq!(stmt.text, "a IN ( NULL )");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut b = CommandBuilder::new();
        b.text("x =").param(SqlValue::Text(String::from("v"))).text("OR y =").deferred(0);
        let dialect = SqliteDialect::new();
        assert_eq!(b.finalize(&dialect), b.finalize(&dialect));
    }

    #[test]
    fn test_render_inline() {
        let mut b = CommandBuilder::new();
        b.text("SELECT * FROM t WHERE s =").param(SqlValue::Text(String::from("it's")));
        assert_eq!(
            b.render_inline(&SqliteDialect::new()).unwrap(),
            "SELECT * FROM t WHERE s = 'it''s'"
        );
        b.deferred(0);
        assert!(b.render_inline(&SqliteDialect::new()).is_err());
    }

    #[test]
    fn test_null_literal_detection() {
        let mut b = CommandBuilder::new();
        b.param(SqlValue::Null);
        assert!(b.is_null_literal());
        b.text("x");
        assert!(!b.is_null_literal());
    }
}
