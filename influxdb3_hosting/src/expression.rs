//! Deferred string templates
//!
//! A [`ReferenceExpression`] is an ordered list of literal text, parameter references, and
//! endpoint property references. It renders to a placeholder string at any time via
//! [`ReferenceExpression::value_expression`] and to its final value via
//! [`ReferenceExpression::resolve`] once every referenced endpoint is allocated.
use std::{fmt::Display, sync::Arc};

use crate::{
    Result,
    endpoint::EndpointReferenceExpression,
    parameter::{ParameterOrDefault, ParameterResource},
};

#[derive(Debug, Clone)]
pub enum ExpressionPart {
    Literal(String),
    Parameter(Arc<ParameterResource>),
    Endpoint(EndpointReferenceExpression),
}

impl ExpressionPart {
    pub fn value_expression(&self) -> String {
        match self {
            Self::Literal(s) => s.clone(),
            Self::Parameter(p) => p.value_expression(),
            Self::Endpoint(e) => e.value_expression(),
        }
    }

    pub fn resolve(&self) -> Result<String> {
        match self {
            Self::Literal(s) => Ok(s.clone()),
            Self::Parameter(p) => Ok(p.value().to_string()),
            Self::Endpoint(e) => e.resolve(),
        }
    }
}

impl From<&str> for ExpressionPart {
    fn from(s: &str) -> Self {
        Self::Literal(s.to_string())
    }
}

impl From<Arc<ParameterResource>> for ExpressionPart {
    fn from(p: Arc<ParameterResource>) -> Self {
        Self::Parameter(p)
    }
}

impl From<EndpointReferenceExpression> for ExpressionPart {
    fn from(e: EndpointReferenceExpression) -> Self {
        Self::Endpoint(e)
    }
}

impl From<ParameterOrDefault> for ExpressionPart {
    fn from(p: ParameterOrDefault) -> Self {
        match p {
            ParameterOrDefault::Supplied(p) => Self::Parameter(p),
            ParameterOrDefault::Default(literal) => Self::Literal(literal.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceExpression {
    parts: Vec<ExpressionPart>,
}

impl ReferenceExpression {
    pub fn builder() -> ReferenceExpressionBuilder {
        ReferenceExpressionBuilder::default()
    }

    /// An expression made of a single part
    pub fn single(part: impl Into<ExpressionPart>) -> Self {
        Self {
            parts: vec![part.into()],
        }
    }

    pub fn parts(&self) -> &[ExpressionPart] {
        &self.parts
    }

    pub fn value_expression(&self) -> String {
        self.parts.iter().map(ExpressionPart::value_expression).collect()
    }

    pub fn resolve(&self) -> Result<String> {
        self.parts.iter().map(ExpressionPart::resolve).collect()
    }

    /// Parameters referenced anywhere in the expression, in order of appearance
    pub fn parameters(&self) -> impl Iterator<Item = &Arc<ParameterResource>> {
        self.parts.iter().filter_map(|part| match part {
            ExpressionPart::Parameter(p) => Some(p),
            _ => None,
        })
    }
}

/// Prints the unresolved form, so secrets never end up in logs
impl Display for ReferenceExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value_expression())
    }
}

#[derive(Debug, Default)]
pub struct ReferenceExpressionBuilder {
    parts: Vec<ExpressionPart>,
}

impl ReferenceExpressionBuilder {
    pub fn append(mut self, part: impl Into<ExpressionPart>) -> Self {
        let part = part.into();
        // adjacent literals are merged to keep the part list canonical
        if let ExpressionPart::Literal(next) = &part {
            if let Some(ExpressionPart::Literal(last)) = self.parts.last_mut() {
                last.push_str(next);
                return self;
            }
        }
        self.parts.push(part);
        self
    }

    pub fn build(self) -> ReferenceExpression {
        ReferenceExpression { parts: self.parts }
    }
}
