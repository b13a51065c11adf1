//! Event data expressions such as `event.detail` or `element.value`.
//!
//! The grammar is limited to literals and member access chains rooted at `event` or `element`:
//!
//! ```text
//! expression := literal | path
//! path       := ("event" | "element") accessor*
//! accessor   := "." identifier | "[" (string | integer) "]"
//! literal    := number | string | "true" | "false" | "null"
//! ```
//!
//! A bare `element` evaluates to the element's state node. Missing members evaluate to [`Value::Null`].

use crate::{
	dom::{Dom, DomNodeId, EventData},
	error::{Error, Result},
	StateNodeId, Value,
};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
	Literal(Value),
	Event(Vec<String>),
	Element(Vec<String>),
}

/// What an expression is evaluated against.
pub struct Scope<'a> {
	pub event: &'a dyn EventData,
	pub element: DomNodeId,
	pub node: StateNodeId,
	pub dom: &'a dyn Dom,
}

impl Expression {
	pub fn parse(source: &str) -> Result<Self> {
		Parser { source, rest: source.trim() }.expression()
	}

	#[must_use]
	pub fn evaluate(&self, scope: &Scope<'_>) -> Value {
		let (first, rest, root) = match self {
			Self::Literal(value) => return value.clone(),
			Self::Element(path) => match path.split_first() {
				Some((first, rest)) => (first, rest, scope.dom.property(scope.element, first)),
				None => return Value::Node(scope.node),
			},
			Self::Event(path) => match path.split_first() {
				Some((first, rest)) => (first, rest, scope.event.get(first)),
				// The event object itself isn't a value.
				None => return Value::Null,
			},
		};
		let mut value = match root {
			Some(value) => value,
			None => {
				trace!("Expression root member {:?} is undefined.", first);
				return Value::Null;
			}
		};
		for key in rest {
			value = match value.member(key) {
				Some(member) => member.clone(),
				None => return Value::Null,
			};
		}
		value
	}
}

struct Parser<'a> {
	source: &'a str,
	rest: &'a str,
}

impl<'a> Parser<'a> {
	fn error(&self, reason: impl Into<String>) -> Error {
		Error::Expression {
			expression: self.source.to_owned(),
			reason: reason.into(),
		}
	}

	fn expression(mut self) -> Result<Expression> {
		let expression = match self.rest.chars().next() {
			None => return Err(self.error("empty expression")),
			Some(quote @ ('\'' | '"')) => Expression::Literal(Value::String(self.string(quote)?)),
			Some(c) if c.is_ascii_digit() || c == '-' => Expression::Literal(Value::Number(self.number()?)),
			Some(_) => {
				let identifier = self.identifier()?;
				match identifier {
					"true" => Expression::Literal(Value::Bool(true)),
					"false" => Expression::Literal(Value::Bool(false)),
					"null" => Expression::Literal(Value::Null),
					"event" => {
						let path = self.accessors()?;
						if path.is_empty() {
							return Err(self.error("expected a member of `event`"));
						}
						Expression::Event(path)
					}
					"element" => Expression::Element(self.accessors()?),
					other => return Err(self.error(format!("unknown identifier `{}`", other))),
				}
			}
		};
		if !self.rest.trim().is_empty() {
			return Err(self.error(format!("unexpected trailing input {:?}", self.rest)));
		}
		Ok(expression)
	}

	fn identifier(&mut self) -> Result<&'a str> {
		let end = self
			.rest
			.char_indices()
			.find(|&(i, c)| !(c == '_' || c == '$' || c.is_alphabetic() || (i > 0 && c.is_ascii_digit())))
			.map_or(self.rest.len(), |(i, _)| i);
		if end == 0 {
			return Err(self.error(format!("expected an identifier at {:?}", self.rest)));
		}
		let (identifier, rest) = self.rest.split_at(end);
		self.rest = rest;
		Ok(identifier)
	}

	fn accessors(&mut self) -> Result<Vec<String>> {
		let mut path = Vec::new();
		loop {
			self.rest = self.rest.trim_start();
			if let Some(rest) = self.rest.strip_prefix('.') {
				self.rest = rest.trim_start();
				path.push(self.identifier()?.to_owned());
			} else if let Some(rest) = self.rest.strip_prefix('[') {
				self.rest = rest.trim_start();
				let key = match self.rest.chars().next() {
					Some(quote @ ('\'' | '"')) => self.string(quote)?,
					Some(c) if c.is_ascii_digit() => {
						let end = self.rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(self.rest.len());
						let (digits, rest) = self.rest.split_at(end);
						self.rest = rest;
						digits.to_owned()
					}
					_ => return Err(self.error("expected a string or index inside `[]`")),
				};
				self.rest = self.rest.trim_start();
				self.rest = self.rest.strip_prefix(']').ok_or_else(|| self.error("expected `]`"))?;
				path.push(key);
			} else {
				return Ok(path);
			}
		}
	}

	fn string(&mut self, quote: char) -> Result<String> {
		let rest = self.rest;
		let mut string = String::new();
		let mut chars = rest.char_indices().skip(1);
		while let Some((i, c)) = chars.next() {
			match c {
				'\\' => match chars.next() {
					Some((_, 'n')) => string.push('\n'),
					Some((_, 't')) => string.push('\t'),
					Some((_, escaped)) => string.push(escaped),
					None => break,
				},
				c if c == quote => {
					self.rest = &rest[i + c.len_utf8()..];
					return Ok(string);
				}
				c => string.push(c),
			}
		}
		Err(self.error("unterminated string literal"))
	}

	fn number(&mut self) -> Result<f64> {
		let end = self
			.rest
			.char_indices()
			.find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || ((c == '-' || c == '+') && i == 0)))
			.map_or(self.rest.len(), |(i, _)| i);
		let (number, rest) = self.rest.split_at(end);
		self.rest = rest;
		number.parse().map_err(|_| self.error(format!("invalid number {:?}", number)))
	}
}

/// Compiled expressions by source text. Compilation is a pure function of the source, so one cache serves every bound node.
#[derive(Debug, Default)]
pub struct ExpressionCache {
	compiled: HashMap<String, Rc<Expression>>,
}

impl ExpressionCache {
	pub fn get_or_compile(&mut self, source: &str) -> Result<Rc<Expression>> {
		if let Some(expression) = self.compiled.get(source) {
			return Ok(Rc::clone(expression));
		}
		let expression = Rc::new(Expression::parse(source)?);
		trace!("Compiled event data expression {:?}.", source);
		self.compiled.insert(source.to_owned(), Rc::clone(&expression));
		Ok(expression)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.compiled.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.compiled.is_empty()
	}
}
