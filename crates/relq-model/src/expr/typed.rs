//! Typed handles and expression wrappers.
//!
//! The typed layer gives comparisons compile-time operand checking: a
//! `FieldRef<i64>` only compares against `i64`-shaped operands. Each handle
//! also records the scalar type it claims so the resolver can cross-check the
//! claim against the model.

use std::marker::PhantomData;

use super::{AggregateFunc, BinaryOp, Expr, OrderSpec, Predicate, UnaryOp};
use crate::plan::{QueryPlan, RelRef};
use crate::types::ScalarType;
use crate::value::Value;

/// Rust types that map onto a scalar column type.
pub trait FieldValue {
    /// Scalar type values of this Rust type are stored as.
    const SCALAR: ScalarType;

    /// Convert into a dynamic value.
    fn into_value(self) -> Value;
}

/// Marker for numeric field value types, required by `sum` and `avg`.
pub trait NumericValue: FieldValue {}

impl FieldValue for bool {
    const SCALAR: ScalarType = ScalarType::Bool;
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl FieldValue for i32 {
    const SCALAR: ScalarType = ScalarType::Int32;
    fn into_value(self) -> Value {
        Value::Int32(self)
    }
}

impl FieldValue for i64 {
    const SCALAR: ScalarType = ScalarType::Int64;
    fn into_value(self) -> Value {
        Value::Int64(self)
    }
}

impl FieldValue for f32 {
    const SCALAR: ScalarType = ScalarType::Float32;
    fn into_value(self) -> Value {
        Value::Float32(self)
    }
}

impl FieldValue for f64 {
    const SCALAR: ScalarType = ScalarType::Float64;
    fn into_value(self) -> Value {
        Value::Float64(self)
    }
}

impl FieldValue for String {
    const SCALAR: ScalarType = ScalarType::String;
    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl NumericValue for i32 {}
impl NumericValue for i64 {}
impl NumericValue for f32 {}
impl NumericValue for f64 {}

/// An aliased occurrence of an entity within one plan.
///
/// The same entity may appear under several aliases (for example a subquery
/// root distinct from the outer root). Aliases mint the typed field and
/// relationship handles expressions are built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityAlias {
    entity: String,
    name: String,
}

impl EntityAlias {
    /// Alias `name` over entity `entity`.
    pub fn new(entity: impl Into<String>, name: impl Into<String>) -> Self {
        EntityAlias {
            entity: entity.into(),
            name: name.into(),
        }
    }

    /// The alias name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The entity name.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Typed handle to a scalar field of this alias.
    ///
    /// The claimed value type is checked against the model during resolution.
    pub fn field<T: FieldValue>(&self, name: impl Into<String>) -> FieldRef<T> {
        FieldRef::new(&self.name, name)
    }

    /// Reference to a relationship declared by this alias's entity.
    pub fn rel(&self, name: impl Into<String>) -> RelRef {
        RelRef::new(&self.name, name)
    }
}

/// Typed handle to a field on an aliased entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef<T> {
    alias: String,
    field: String,
    _value: PhantomData<fn() -> T>,
}

impl<T: FieldValue> FieldRef<T> {
    fn new(alias: impl Into<String>, field: impl Into<String>) -> Self {
        FieldRef {
            alias: alias.into(),
            field: field.into(),
            _value: PhantomData,
        }
    }

    /// The alias this field belongs to.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The field name.
    pub fn name(&self) -> &str {
        &self.field
    }

    /// The underlying expression, claiming this handle's scalar type.
    pub fn expr(&self) -> Expr {
        Expr::Field {
            alias: self.alias.clone(),
            field: self.field.clone(),
            claimed: Some(T::SCALAR),
        }
    }

    /// View as a typed expression.
    pub fn typed(&self) -> TypedExpr<T> {
        TypedExpr::new(self.expr())
    }

    /// `self = rhs`
    pub fn eq(&self, rhs: impl Operand<T>) -> Predicate {
        self.typed().eq(rhs)
    }

    /// `self <> rhs`
    pub fn ne(&self, rhs: impl Operand<T>) -> Predicate {
        self.typed().ne(rhs)
    }

    /// `self > rhs`
    pub fn gt(&self, rhs: impl Operand<T>) -> Predicate {
        self.typed().gt(rhs)
    }

    /// `self >= rhs`
    pub fn goe(&self, rhs: impl Operand<T>) -> Predicate {
        self.typed().goe(rhs)
    }

    /// `self < rhs`
    pub fn lt(&self, rhs: impl Operand<T>) -> Predicate {
        self.typed().lt(rhs)
    }

    /// `self <= rhs`
    pub fn loe(&self, rhs: impl Operand<T>) -> Predicate {
        self.typed().loe(rhs)
    }

    /// Membership in a list of values or a subquery.
    pub fn is_in(&self, rhs: impl OperandList<T>) -> Predicate {
        Predicate::new(Expr::binary(
            BinaryOp::In,
            self.expr(),
            rhs.into_operand_list(),
        ))
    }

    /// `lo <= self <= hi`, inclusive on both ends.
    pub fn between(&self, lo: impl Operand<T>, hi: impl Operand<T>) -> Predicate {
        self.goe(lo).and(self.loe(hi))
    }

    /// `self is null`
    pub fn is_null(&self) -> Predicate {
        Predicate::new(Expr::Unary {
            op: UnaryOp::IsNull,
            expr: Box::new(self.expr()),
        })
    }

    /// `self is not null`
    pub fn is_not_null(&self) -> Predicate {
        Predicate::new(Expr::Unary {
            op: UnaryOp::IsNotNull,
            expr: Box::new(self.expr()),
        })
    }

    /// `count(self)`
    pub fn count(&self) -> TypedExpr<i64> {
        TypedExpr::new(aggregate(AggregateFunc::Count, self.expr()))
    }

    /// `max(self)`
    pub fn max(&self) -> TypedExpr<T> {
        TypedExpr::new(aggregate(AggregateFunc::Max, self.expr()))
    }

    /// `min(self)`
    pub fn min(&self) -> TypedExpr<T> {
        TypedExpr::new(aggregate(AggregateFunc::Min, self.expr()))
    }

    /// Ascending order on this field.
    pub fn asc(&self) -> OrderSpec {
        OrderSpec::asc(self.expr())
    }

    /// Descending order on this field.
    pub fn desc(&self) -> OrderSpec {
        OrderSpec::desc(self.expr())
    }
}

impl<T: NumericValue> FieldRef<T> {
    /// `sum(self)`
    pub fn sum(&self) -> TypedExpr<T> {
        TypedExpr::new(aggregate(AggregateFunc::Sum, self.expr()))
    }

    /// `avg(self)`
    pub fn avg(&self) -> TypedExpr<f64> {
        TypedExpr::new(aggregate(AggregateFunc::Avg, self.expr()))
    }
}

impl FieldRef<String> {
    /// SQL `LIKE` match; `%` and `_` are wildcards.
    pub fn like(&self, pattern: impl Into<String>) -> Predicate {
        Predicate::new(Expr::binary(
            BinaryOp::Like,
            self.expr(),
            Expr::literal(pattern.into()),
        ))
    }

    /// Substring match, sugar for `like '%needle%'`.
    pub fn contains(&self, needle: impl Into<String>) -> Predicate {
        self.like(format!("%{}%", needle.into()))
    }

    /// Prefix match, sugar for `like 'prefix%'`.
    pub fn starts_with(&self, prefix: impl Into<String>) -> Predicate {
        self.like(format!("{}%", prefix.into()))
    }
}

fn aggregate(func: AggregateFunc, arg: Expr) -> Expr {
    Expr::Aggregate {
        func,
        arg: Some(Box::new(arg)),
    }
}

/// A typed wrapper over an untyped expression.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpr<T> {
    expr: Expr,
    _value: PhantomData<fn() -> T>,
}

impl<T: FieldValue> TypedExpr<T> {
    pub(crate) fn new(expr: Expr) -> Self {
        TypedExpr {
            expr,
            _value: PhantomData,
        }
    }

    /// Borrow the underlying expression.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Consume into the underlying expression.
    pub fn into_expr(self) -> Expr {
        self.expr
    }

    /// `self = rhs`
    pub fn eq(&self, rhs: impl Operand<T>) -> Predicate {
        self.compare(BinaryOp::Eq, rhs)
    }

    /// `self <> rhs`
    pub fn ne(&self, rhs: impl Operand<T>) -> Predicate {
        self.compare(BinaryOp::Ne, rhs)
    }

    /// `self > rhs`
    pub fn gt(&self, rhs: impl Operand<T>) -> Predicate {
        self.compare(BinaryOp::Gt, rhs)
    }

    /// `self >= rhs`
    pub fn goe(&self, rhs: impl Operand<T>) -> Predicate {
        self.compare(BinaryOp::Goe, rhs)
    }

    /// `self < rhs`
    pub fn lt(&self, rhs: impl Operand<T>) -> Predicate {
        self.compare(BinaryOp::Lt, rhs)
    }

    /// `self <= rhs`
    pub fn loe(&self, rhs: impl Operand<T>) -> Predicate {
        self.compare(BinaryOp::Loe, rhs)
    }

    /// Ascending order on this expression.
    pub fn asc(&self) -> OrderSpec {
        OrderSpec::asc(self.expr.clone())
    }

    /// Descending order on this expression.
    pub fn desc(&self) -> OrderSpec {
        OrderSpec::desc(self.expr.clone())
    }

    fn compare(&self, op: BinaryOp, rhs: impl Operand<T>) -> Predicate {
        Predicate::new(Expr::binary(op, self.expr.clone(), rhs.into_operand()))
    }
}

/// A plan used as a scalar expression.
///
/// Valid as a comparison operand or a projection item; the resolver checks
/// that the wrapped plan projects exactly one expression and that its type is
/// comparable where it is used.
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery(QueryPlan);

impl Subquery {
    /// Wrap a built plan for scalar use.
    pub fn scalar(plan: QueryPlan) -> Self {
        Subquery(plan)
    }

    /// Consume into an expression.
    pub fn into_expr(self) -> Expr {
        Expr::Subquery(Box::new(self.0))
    }
}

/// Right-hand side of a typed comparison.
///
/// Implemented by plain values (which become bound literals), field handles
/// and typed expressions of the same value type, and scalar subqueries
/// (whose projected type is checked during resolution).
pub trait Operand<T> {
    /// Convert into the untyped expression standing on the right-hand side.
    fn into_operand(self) -> Expr;
}

impl Operand<bool> for bool {
    fn into_operand(self) -> Expr {
        Expr::Literal(self.into_value())
    }
}

impl Operand<i32> for i32 {
    fn into_operand(self) -> Expr {
        Expr::Literal(self.into_value())
    }
}

impl Operand<i64> for i64 {
    fn into_operand(self) -> Expr {
        Expr::Literal(self.into_value())
    }
}

impl Operand<f32> for f32 {
    fn into_operand(self) -> Expr {
        Expr::Literal(self.into_value())
    }
}

impl Operand<f64> for f64 {
    fn into_operand(self) -> Expr {
        Expr::Literal(self.into_value())
    }
}

impl Operand<String> for String {
    fn into_operand(self) -> Expr {
        Expr::Literal(self.into_value())
    }
}

impl Operand<String> for &str {
    fn into_operand(self) -> Expr {
        Expr::Literal(Value::String(self.to_string()))
    }
}

impl<T: FieldValue> Operand<T> for FieldRef<T> {
    fn into_operand(self) -> Expr {
        self.expr()
    }
}

impl<T: FieldValue> Operand<T> for &FieldRef<T> {
    fn into_operand(self) -> Expr {
        self.expr()
    }
}

impl<T: FieldValue> Operand<T> for TypedExpr<T> {
    fn into_operand(self) -> Expr {
        self.into_expr()
    }
}

impl<T> Operand<T> for Subquery {
    fn into_operand(self) -> Expr {
        self.into_expr()
    }
}

/// Right-hand side of a membership test.
pub trait OperandList<T> {
    /// Convert into the untyped list or subquery expression.
    fn into_operand_list(self) -> Expr;
}

impl<T: FieldValue> OperandList<T> for Vec<T> {
    fn into_operand_list(self) -> Expr {
        Expr::List(self.into_iter().map(|v| Expr::Literal(v.into_value())).collect())
    }
}

impl<T: FieldValue, const N: usize> OperandList<T> for [T; N] {
    fn into_operand_list(self) -> Expr {
        Expr::List(self.into_iter().map(|v| Expr::Literal(v.into_value())).collect())
    }
}

impl<const N: usize> OperandList<String> for [&str; N] {
    fn into_operand_list(self) -> Expr {
        Expr::List(
            self.into_iter()
                .map(|v| Expr::Literal(Value::String(v.to_string())))
                .collect(),
        )
    }
}

impl<T> OperandList<T> for Subquery {
    fn into_operand_list(self) -> Expr {
        self.into_expr()
    }
}
