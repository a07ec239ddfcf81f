//! The resolver: alias binding, reference checking, and fetch rules.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use relq_model::{
    BinaryOp, EntityDef, Expr, JoinKind, Model, Projection, QueryPlan, ScalarType, Source,
};

use super::{Advisory, AliasBinding, FetchPath, ResolvedPlan};
use crate::error::ResolutionError;

/// Checks plans against a model before translation.
pub struct Resolver<'a> {
    model: &'a Model,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over the given model.
    pub fn new(model: &'a Model) -> Self {
        Resolver { model }
    }

    /// Resolve a plan: bind every alias, validate every field, relationship,
    /// and subquery reference, and enforce the fetch join rules.
    pub fn resolve(&self, plan: QueryPlan) -> Result<ResolvedPlan, ResolutionError> {
        if plan.sources.is_empty() {
            return Err(ResolutionError::InvalidPlan(
                "plan has no source".to_string(),
            ));
        }

        let mut bindings: Vec<AliasBinding> = Vec::new();
        for source in &plan.sources {
            match source {
                Source::Entity { entity, alias } => {
                    let def = self.entity(entity)?;
                    bind(&mut bindings, alias, def.clone())?;
                }
                Source::Subquery { alias, .. } => {
                    return Err(ResolutionError::SubqueryAsSource {
                        alias: alias.clone(),
                    });
                }
            }
        }

        let mut fetched: Vec<FetchPath> = Vec::new();
        for join in &plan.joins {
            let target = self.entity(&join.entity)?;
            match &join.relation {
                Some(rel) => {
                    let source_entity = lookup(&bindings, &rel.source_alias)?.entity.name.clone();
                    let relation = self
                        .model
                        .get_relation(&source_entity, &rel.relation)
                        .ok_or_else(|| ResolutionError::UnknownRelation {
                            entity: source_entity.clone(),
                            relation: rel.relation.clone(),
                        })?;
                    if relation.target != join.entity {
                        return Err(ResolutionError::RelationTargetMismatch {
                            path: rel.path(),
                            alias: join.alias.clone(),
                            expected: relation.target.clone(),
                            actual: join.entity.clone(),
                        });
                    }
                    if join.kind == JoinKind::Fetch {
                        fetched.push(FetchPath {
                            source_alias: rel.source_alias.clone(),
                            relation: relation.clone(),
                            target_alias: join.alias.clone(),
                        });
                    }
                }
                None => {
                    // Without a relationship to drive the join, inner
                    // correlation belongs in the filter; only the outer form
                    // with an explicit on predicate means anything here.
                    if join.kind != JoinKind::LeftOuter {
                        return Err(ResolutionError::InvalidPlan(format!(
                            "join to alias '{}' names no relationship; correlate it through the filter or declare a left outer join with an on predicate",
                            join.alias
                        )));
                    }
                    if join.on.is_none() {
                        return Err(ResolutionError::InvalidPlan(format!(
                            "outer join to unrelated alias '{}' requires an on predicate",
                            join.alias
                        )));
                    }
                }
            }
            bind(&mut bindings, &join.alias, target.clone())?;
        }

        let mut advisories = Vec::new();
        if !fetched.is_empty() {
            self.check_fetches(&plan, &fetched, &mut advisories)?;
        }

        match &plan.projection {
            Projection::Entity { alias, .. } => {
                lookup(&bindings, alias)?;
            }
            Projection::Exprs(exprs) => {
                for expr in exprs {
                    self.expr_type(expr, &bindings)?;
                }
            }
        }
        for join in &plan.joins {
            if let Some(on) = &join.on {
                self.expr_type(on.expr(), &bindings)?;
            }
        }
        if let Some(filter) = &plan.filter {
            self.expr_type(filter.expr(), &bindings)?;
        }
        for key in &plan.group_by {
            self.expr_type(key, &bindings)?;
        }
        if let Some(having) = &plan.having {
            self.expr_type(having.expr(), &bindings)?;
        }
        for spec in &plan.order_by {
            self.expr_type(&spec.expr, &bindings)?;
        }

        debug!(
            root = bindings[0].alias.as_str(),
            joins = plan.joins.len(),
            fetched = fetched.len(),
            "Resolved query plan"
        );

        Ok(ResolvedPlan {
            plan,
            bindings,
            fetched,
            advisories,
        })
    }

    fn check_fetches(
        &self,
        plan: &QueryPlan,
        fetched: &[FetchPath],
        advisories: &mut Vec<Advisory>,
    ) -> Result<(), ResolutionError> {
        let root_alias = match &plan.projection {
            Projection::Entity { alias, .. } => alias.as_str(),
            Projection::Exprs(_) => {
                return Err(ResolutionError::FetchWithoutOwner {
                    path: fetched[0].path(),
                });
            }
        };

        // The projected entity graph: the root plus every alias reachable
        // from it through relationship joins.
        let mut graph: BTreeSet<&str> = BTreeSet::new();
        graph.insert(root_alias);
        let mut changed = true;
        while changed {
            changed = false;
            for join in &plan.joins {
                if let Some(rel) = &join.relation {
                    if graph.contains(rel.source_alias.as_str()) && graph.insert(&join.alias) {
                        changed = true;
                    }
                }
            }
        }

        for fetch in fetched {
            if !graph.contains(fetch.source_alias.as_str()) {
                return Err(ResolutionError::FetchUnreachable { path: fetch.path() });
            }
        }

        let mut first_collection: Option<&FetchPath> = None;
        for fetch in fetched {
            if fetch.relation.is_to_many() {
                if let Some(first) = first_collection {
                    return Err(ResolutionError::MultipleCollectionFetch {
                        first: first.path(),
                        second: fetch.path(),
                    });
                }
                first_collection = Some(fetch);
            }
        }

        for fetch in fetched {
            if fetch.source_alias != root_alias {
                warn!(path = %fetch.path(), "Fetch join owner is not the plan root");
                advisories.push(Advisory::NestedFetch { path: fetch.path() });
            }
        }
        Ok(())
    }

    /// Compute an expression's scalar type while validating every reference
    /// in it. `None` means the type is unknowable (a null literal).
    fn expr_type(
        &self,
        expr: &Expr,
        bindings: &[AliasBinding],
    ) -> Result<Option<ScalarType>, ResolutionError> {
        match expr {
            Expr::Literal(value) => Ok(value.scalar_type()),
            Expr::Field {
                alias,
                field,
                claimed,
            } => {
                let binding = lookup(bindings, alias)?;
                let def = binding.entity.get_field(field).ok_or_else(|| {
                    ResolutionError::UnknownField {
                        alias: alias.clone(),
                        entity: binding.entity.name.clone(),
                        field: field.clone(),
                    }
                })?;
                if let Some(claimed) = claimed {
                    if *claimed != def.scalar_type {
                        return Err(ResolutionError::FieldTypeMismatch {
                            alias: alias.clone(),
                            field: field.clone(),
                            claimed: *claimed,
                            actual: def.scalar_type,
                        });
                    }
                }
                Ok(Some(def.scalar_type))
            }
            Expr::Binary { op, lhs, rhs } if op.is_comparison() => {
                let lt = self.expr_type(lhs, bindings)?;
                let rt = self.expr_type(rhs, bindings)?;
                comparable(*op, lt, rt)?;
                Ok(Some(ScalarType::Bool))
            }
            Expr::Binary {
                op: BinaryOp::Like,
                lhs,
                rhs,
            } => {
                for side in [lhs, rhs] {
                    if let Some(t) = self.expr_type(side, bindings)? {
                        if t != ScalarType::String {
                            return Err(ResolutionError::LikeOnNonString { actual: t });
                        }
                    }
                }
                Ok(Some(ScalarType::Bool))
            }
            Expr::Binary {
                op: BinaryOp::In,
                lhs,
                rhs,
            } => {
                let lt = self.expr_type(lhs, bindings)?;
                match rhs.as_ref() {
                    Expr::List(items) => {
                        for item in items {
                            let it = self.expr_type(item, bindings)?;
                            comparable(BinaryOp::In, lt, it)?;
                        }
                    }
                    other => {
                        let rt = self.expr_type(other, bindings)?;
                        comparable(BinaryOp::In, lt, rt)?;
                    }
                }
                Ok(Some(ScalarType::Bool))
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.expr_type(lhs, bindings)?;
                self.expr_type(rhs, bindings)?;
                Ok(Some(ScalarType::Bool))
            }
            Expr::Unary { expr, .. } => {
                self.expr_type(expr, bindings)?;
                Ok(Some(ScalarType::Bool))
            }
            Expr::List(items) => {
                let mut found = None;
                for item in items {
                    let t = self.expr_type(item, bindings)?;
                    if found.is_none() {
                        found = t;
                    }
                }
                Ok(found)
            }
            Expr::Aggregate { func, arg } => {
                let arg_type = match arg {
                    Some(arg) => self.expr_type(arg, bindings)?,
                    None => None,
                };
                Ok(func.result_type(arg_type))
            }
            Expr::Subquery(sub) => self.scalar_subquery_type(sub),
        }
    }

    /// Resolve a subquery and return the type of its single projected
    /// expression.
    fn scalar_subquery_type(
        &self,
        sub: &QueryPlan,
    ) -> Result<Option<ScalarType>, ResolutionError> {
        let resolved = self.resolve(sub.clone())?;
        match &resolved.plan.projection {
            Projection::Exprs(exprs) if exprs.len() == 1 => {
                self.expr_type(&exprs[0], &resolved.bindings)
            }
            Projection::Exprs(exprs) => Err(ResolutionError::NonScalarSubquery {
                found: exprs.len(),
            }),
            Projection::Entity { alias, .. } => {
                // An entity projection stands for all of the entity's
                // columns.
                let found = resolved
                    .binding(alias)
                    .map(|b| b.entity.fields.len())
                    .unwrap_or(0);
                Err(ResolutionError::NonScalarSubquery { found })
            }
        }
    }

    fn entity(&self, name: &str) -> Result<&'a EntityDef, ResolutionError> {
        self.model
            .get_entity(name)
            .ok_or_else(|| ResolutionError::UnknownEntity {
                entity: name.to_string(),
            })
    }
}

fn bind(
    bindings: &mut Vec<AliasBinding>,
    alias: &str,
    entity: EntityDef,
) -> Result<(), ResolutionError> {
    if bindings.iter().any(|b| b.alias == alias) {
        return Err(ResolutionError::InvalidPlan(format!(
            "duplicate alias '{alias}'"
        )));
    }
    bindings.push(AliasBinding {
        alias: alias.to_string(),
        entity,
    });
    Ok(())
}

fn lookup<'b>(
    bindings: &'b [AliasBinding],
    alias: &str,
) -> Result<&'b AliasBinding, ResolutionError> {
    bindings
        .iter()
        .find(|b| b.alias == alias)
        .ok_or_else(|| ResolutionError::InvalidPlan(format!("alias '{alias}' is not declared")))
}

fn comparable(
    op: BinaryOp,
    lhs: Option<ScalarType>,
    rhs: Option<ScalarType>,
) -> Result<(), ResolutionError> {
    if let (Some(l), Some(r)) = (lhs, rhs) {
        if !l.is_comparable_with(&r) {
            return Err(ResolutionError::IncomparableOperands {
                op: op.symbol().to_string(),
                lhs: l,
                rhs: r,
            });
        }
    }
    Ok(())
}
