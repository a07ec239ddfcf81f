//! Fluent plan builder.

use std::collections::BTreeSet;

use super::{JoinKind, JoinSpec, Pagination, Projection, QueryPlan, RelRef, Source};
use crate::error::BuildError;
use crate::expr::{EntityAlias, Expr, OrderSpec, Predicate, PredicateSlot};

/// Fluent builder for [`QueryPlan`].
///
/// Every method consumes and returns the builder, so each chain owns its
/// state and the finished plan is immutable. [`Query::build`] runs the
/// structural checks that need no model: alias scoping, aggregate placement,
/// group-by completeness, and pagination determinism.
#[derive(Debug, Clone)]
pub struct Query {
    projection: Projection,
    sources: Vec<Source>,
    joins: Vec<JoinSpec>,
    filter: Option<Predicate>,
    group_by: Vec<Expr>,
    having: Option<Predicate>,
    order_by: Vec<OrderSpec>,
    offset: Option<u64>,
    limit: Option<u64>,
}

impl Query {
    fn with_projection(projection: Projection) -> Query {
        Query {
            projection,
            sources: Vec::new(),
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    /// Plan selecting the whole `root` entity, rooted at `root`.
    pub fn entity(root: &EntityAlias) -> Query {
        let mut query = Query::with_projection(Projection::Entity {
            alias: root.name().to_string(),
            distinct: false,
        });
        query.sources.push(Source::Entity {
            entity: root.entity().to_string(),
            alias: root.name().to_string(),
        });
        query
    }

    /// Like [`Query::entity`], with row-level duplicate elimination.
    pub fn entity_distinct(root: &EntityAlias) -> Query {
        let mut query = Query::entity(root);
        if let Projection::Entity { distinct, .. } = &mut query.projection {
            *distinct = true;
        }
        query
    }

    /// Plan projecting a list of expressions; declare the root with
    /// [`Query::from`].
    pub fn select<I>(exprs: I) -> Query
    where
        I: IntoIterator<Item = Expr>,
    {
        Query::with_projection(Projection::Exprs(exprs.into_iter().collect()))
    }

    /// Declare a source. The first declared source is the root; later ones
    /// are unrelated pairs, correlated through `filter` (inner-style only).
    pub fn from(mut self, source: &EntityAlias) -> Query {
        self.sources.push(Source::Entity {
            entity: source.entity().to_string(),
            alias: source.name().to_string(),
        });
        self
    }

    /// Declare an additional unrelated source (theta-style). Correlation
    /// lives in `filter`; use [`Query::left_join_entity`] when outer
    /// semantics are needed.
    pub fn cross_join(mut self, source: &EntityAlias) -> Query {
        self.sources.push(Source::Entity {
            entity: source.entity().to_string(),
            alias: source.name().to_string(),
        });
        self
    }

    /// Declare a subquery as a source. Representable so the resolver can
    /// reject it descriptively; relational targets cannot select from a
    /// derived table.
    pub fn from_subquery(mut self, plan: QueryPlan, alias: impl Into<String>) -> Query {
        self.sources.push(Source::Subquery {
            plan: Box::new(plan),
            alias: alias.into(),
        });
        self
    }

    /// Inner join along a relationship.
    pub fn join(self, rel: RelRef, target: &EntityAlias) -> Query {
        self.push_join(Some(rel), target, JoinKind::Plain, None)
    }

    /// Inner join with an extra `on` condition, result-equivalent to putting
    /// the condition in `filter`.
    pub fn join_on(self, rel: RelRef, target: &EntityAlias, on: Predicate) -> Query {
        self.push_join(Some(rel), target, JoinKind::Plain, Some(on))
    }

    /// Left outer join along a relationship.
    pub fn left_join(self, rel: RelRef, target: &EntityAlias) -> Query {
        self.push_join(Some(rel), target, JoinKind::LeftOuter, None)
    }

    /// Left outer join with an extra `on` condition. Moving the condition to
    /// `filter` would drop the unmatched rows the outer join keeps.
    pub fn left_join_on(self, rel: RelRef, target: &EntityAlias, on: Predicate) -> Query {
        self.push_join(Some(rel), target, JoinKind::LeftOuter, Some(on))
    }

    /// Inner join along a relationship, eagerly materializing the target
    /// into the projected entity graph.
    pub fn fetch_join(self, rel: RelRef, target: &EntityAlias) -> Query {
        self.push_join(Some(rel), target, JoinKind::Fetch, None)
    }

    /// Left outer join against an unrelated entity; `on` carries the whole
    /// correlation.
    pub fn left_join_entity(self, target: &EntityAlias, on: Predicate) -> Query {
        self.push_join(None, target, JoinKind::LeftOuter, Some(on))
    }

    /// Add a filter slot; absent slots are dropped, present ones conjoined.
    pub fn filter(mut self, slot: impl PredicateSlot) -> Query {
        self.filter = Predicate::all([self.filter.take(), slot.into_slot()]);
        self
    }

    /// Group rows by the given keys. Keys are compared structurally with
    /// projected, having, and ordering expressions.
    pub fn group_by<I>(mut self, keys: I) -> Query
    where
        I: IntoIterator<Item = Expr>,
    {
        self.group_by.extend(keys);
        self
    }

    /// Filter groups after aggregation; repeated calls conjoin.
    pub fn having(mut self, predicate: Predicate) -> Query {
        self.having = Predicate::all([self.having.take(), Some(predicate)]);
        self
    }

    /// Add an ordering key.
    pub fn order_by(mut self, spec: OrderSpec) -> Query {
        self.order_by.push(spec);
        self
    }

    /// Skip the first `n` rows.
    pub fn offset(mut self, n: u64) -> Query {
        self.offset = Some(n);
        self
    }

    /// Return at most `n` rows.
    pub fn limit(mut self, n: u64) -> Query {
        self.limit = Some(n);
        self
    }

    fn push_join(
        mut self,
        relation: Option<RelRef>,
        target: &EntityAlias,
        kind: JoinKind,
        on: Option<Predicate>,
    ) -> Query {
        self.joins.push(JoinSpec {
            relation,
            entity: target.entity().to_string(),
            alias: target.name().to_string(),
            kind,
            on,
        });
        self
    }

    /// Validate and freeze the plan.
    pub fn build(self) -> Result<QueryPlan, BuildError> {
        if self.sources.is_empty() {
            return Err(BuildError::MissingSource);
        }

        let mut declared: Vec<String> = Vec::new();
        for source in &self.sources {
            push_declared(&mut declared, source.alias())?;
        }
        let source_count = declared.len();
        for join in &self.joins {
            push_declared(&mut declared, &join.alias)?;
        }

        // A join may only reference sources and earlier joins; its own alias
        // is in scope for `on`.
        for (i, join) in self.joins.iter().enumerate() {
            let scope: BTreeSet<&str> = declared[..source_count + i + 1]
                .iter()
                .map(String::as_str)
                .collect();
            if let Some(rel) = &join.relation {
                if !scope.contains(rel.source_alias.as_str()) {
                    return Err(scoping_error(&declared, &rel.source_alias));
                }
            }
            if let Some(on) = &join.on {
                if on.expr().contains_aggregate() {
                    return Err(BuildError::MisplacedAggregate { context: "join on" });
                }
                let mut refs = BTreeSet::new();
                on.expr().collect_aliases(&mut refs);
                if let Some(alias) = refs.iter().find(|a| !scope.contains(**a)) {
                    return Err(scoping_error(&declared, alias));
                }
            }
        }

        let all: BTreeSet<&str> = declared.iter().map(String::as_str).collect();
        let mut referenced = BTreeSet::new();
        match &self.projection {
            Projection::Entity { alias, .. } => {
                if !all.contains(alias.as_str()) {
                    return Err(BuildError::UnknownAlias {
                        alias: alias.clone(),
                    });
                }
            }
            Projection::Exprs(exprs) => {
                for expr in exprs {
                    expr.collect_aliases(&mut referenced);
                }
            }
        }
        if let Some(filter) = &self.filter {
            if filter.expr().contains_aggregate() {
                return Err(BuildError::MisplacedAggregate { context: "filter" });
            }
            filter.expr().collect_aliases(&mut referenced);
        }
        for key in &self.group_by {
            key.collect_aliases(&mut referenced);
        }
        if let Some(having) = &self.having {
            having.expr().collect_aliases(&mut referenced);
        }
        for spec in &self.order_by {
            spec.expr.collect_aliases(&mut referenced);
        }
        if let Some(alias) = referenced.iter().find(|a| !all.contains(**a)) {
            return Err(BuildError::UnknownAlias {
                alias: (*alias).to_string(),
            });
        }

        if self.group_by.is_empty() {
            if self.having.is_some() {
                return Err(BuildError::HavingWithoutGroupBy);
            }
            if let Projection::Exprs(exprs) = &self.projection {
                let has_aggregate = exprs.iter().any(Expr::contains_aggregate);
                if has_aggregate {
                    if let Some(bare) = exprs.iter().find(|e| !e.contains_aggregate()) {
                        return Err(BuildError::IncompleteGroupBy {
                            expr: bare.to_string(),
                        });
                    }
                }
            }
            if self.order_by.iter().any(|s| s.expr.contains_aggregate()) {
                return Err(BuildError::MisplacedAggregate { context: "order by" });
            }
        } else {
            match &self.projection {
                Projection::Entity { alias, .. } => {
                    return Err(BuildError::GroupedEntityProjection {
                        alias: alias.clone(),
                    });
                }
                Projection::Exprs(exprs) => {
                    for expr in exprs {
                        check_grouped(expr, &self.group_by)?;
                    }
                }
            }
            if let Some(having) = &self.having {
                check_grouped(having.expr(), &self.group_by)?;
            }
            for spec in &self.order_by {
                check_grouped(&spec.expr, &self.group_by)?;
            }
        }

        if (self.offset.is_some() || self.limit.is_some()) && self.order_by.is_empty() {
            return Err(BuildError::PaginationWithoutOrder);
        }

        Ok(QueryPlan {
            sources: self.sources,
            projection: self.projection,
            joins: self.joins,
            filter: self.filter,
            group_by: self.group_by,
            having: self.having,
            order_by: self.order_by,
            pagination: Pagination {
                offset: self.offset,
                limit: self.limit,
            },
        })
    }
}

fn push_declared(declared: &mut Vec<String>, alias: &str) -> Result<(), BuildError> {
    if declared.iter().any(|a| a == alias) {
        return Err(BuildError::DuplicateAlias {
            alias: alias.to_string(),
        });
    }
    declared.push(alias.to_string());
    Ok(())
}

fn scoping_error(declared: &[String], alias: &str) -> BuildError {
    if declared.iter().any(|a| a == alias) {
        BuildError::AliasUsedBeforeDeclared {
            alias: alias.to_string(),
        }
    } else {
        BuildError::UnknownAlias {
            alias: alias.to_string(),
        }
    }
}

/// Check that every field reference outside an aggregate is covered by the
/// group key.
fn check_grouped(expr: &Expr, keys: &[Expr]) -> Result<(), BuildError> {
    if keys.contains(expr) {
        return Ok(());
    }
    match expr {
        Expr::Aggregate { .. } | Expr::Literal(_) | Expr::Subquery(_) => Ok(()),
        Expr::Field { .. } => Err(BuildError::IncompleteGroupBy {
            expr: expr.to_string(),
        }),
        Expr::Binary { lhs, rhs, .. } => {
            check_grouped(lhs, keys)?;
            check_grouped(rhs, keys)
        }
        Expr::Unary { expr, .. } => check_grouped(expr, keys),
        Expr::List(items) => {
            for item in items {
                check_grouped(item, keys)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::count_all;

    fn member() -> EntityAlias {
        EntityAlias::new("Member", "m")
    }

    fn team() -> EntityAlias {
        EntityAlias::new("Team", "t")
    }

    #[test]
    fn test_entity_plan() {
        let m = member();
        let plan = Query::entity(&m)
            .filter(m.field::<i64>("age").goe(30))
            .build()
            .expect("valid plan");
        assert_eq!(plan.sources.len(), 1);
        assert!(matches!(plan.projection, Projection::Entity { ref alias, distinct: false } if alias == "m"));
        assert!(plan.filter.is_some());
    }

    #[test]
    fn test_missing_source() {
        let m = member();
        let err = Query::select([m.field::<i64>("age").expr()])
            .build()
            .expect_err("no source");
        assert_eq!(err, BuildError::MissingSource);
    }

    #[test]
    fn test_unknown_alias_in_filter() {
        let m = member();
        let t = team();
        let err = Query::entity(&m)
            .filter(t.field::<String>("name").eq("teamA"))
            .build()
            .expect_err("t is not declared");
        assert_eq!(
            err,
            BuildError::UnknownAlias {
                alias: "t".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_alias() {
        let m = member();
        let m2 = EntityAlias::new("Member", "m");
        let err = Query::entity(&m)
            .cross_join(&m2)
            .build()
            .expect_err("duplicate alias");
        assert_eq!(
            err,
            BuildError::DuplicateAlias {
                alias: "m".to_string()
            }
        );
    }

    #[test]
    fn test_join_alias_scoping() {
        let m = member();
        let t = team();
        let other = EntityAlias::new("Team", "t2");
        // The first join references t2, which only the second join declares.
        let err = Query::entity(&m)
            .join(RelRef::new("t2", "members"), &t)
            .left_join_entity(&other, m.field::<i64>("age").goe(0))
            .build()
            .expect_err("t2 is declared after its first use");
        assert_eq!(
            err,
            BuildError::AliasUsedBeforeDeclared {
                alias: "t2".to_string()
            }
        );
    }

    #[test]
    fn test_filter_slots_drop_absent() {
        let m = member();
        let age = m.field::<i64>("age");
        let plan = Query::entity(&m)
            .filter(age.goe(10))
            .filter(None::<Predicate>)
            .filter(age.lt(40))
            .build()
            .expect("valid plan");
        assert_eq!(
            plan.filter.map(|p| p.expr().to_string()),
            Some("((m.age >= 10) and (m.age < 40))".to_string())
        );
    }

    #[test]
    fn test_pagination_requires_order() {
        let m = member();
        let err = Query::entity(&m).limit(2).build().expect_err("no order");
        assert_eq!(err, BuildError::PaginationWithoutOrder);

        let plan = Query::entity(&m)
            .order_by(m.field::<i64>("age").desc())
            .offset(1)
            .limit(2)
            .build()
            .expect("ordered pagination is fine");
        assert_eq!(plan.pagination.offset, Some(1));
        assert_eq!(plan.pagination.limit, Some(2));
    }

    #[test]
    fn test_group_by_completeness() {
        let m = member();
        let t = team();
        let t_name = t.field::<String>("name");
        let age = m.field::<i64>("age");

        let plan = Query::select([t_name.expr(), age.avg().into_expr()])
            .from(&m)
            .join(m.rel("team"), &t)
            .group_by([t_name.expr()])
            .build()
            .expect("grouped on t.name");
        assert_eq!(plan.group_by.len(), 1);

        let err = Query::select([t_name.expr(), age.avg().into_expr()])
            .from(&m)
            .join(m.rel("team"), &t)
            .group_by([age.expr()])
            .build()
            .expect_err("t.name is not in the key");
        assert_eq!(
            err,
            BuildError::IncompleteGroupBy {
                expr: "t.name".to_string()
            }
        );
    }

    #[test]
    fn test_ungrouped_mixed_projection() {
        let m = member();
        let err = Query::select([
            m.field::<String>("name").expr(),
            m.field::<i64>("age").avg().into_expr(),
        ])
        .from(&m)
        .build()
        .expect_err("bare field next to an aggregate");
        assert_eq!(
            err,
            BuildError::IncompleteGroupBy {
                expr: "m.name".to_string()
            }
        );
    }

    #[test]
    fn test_global_aggregate_projection() {
        let m = member();
        let age = m.field::<i64>("age");
        let plan = Query::select([
            count_all().into_expr(),
            age.sum().into_expr(),
            age.avg().into_expr(),
            age.max().into_expr(),
            age.min().into_expr(),
        ])
        .from(&m)
        .build()
        .expect("all-aggregate projection needs no group key");
        assert!(plan.group_by.is_empty());
    }

    #[test]
    fn test_grouped_entity_projection() {
        let m = member();
        let err = Query::entity(&m)
            .group_by([m.field::<i64>("age").expr()])
            .build()
            .expect_err("entity projections cannot be grouped");
        assert_eq!(
            err,
            BuildError::GroupedEntityProjection {
                alias: "m".to_string()
            }
        );
    }

    #[test]
    fn test_having_rules() {
        let m = member();
        let age = m.field::<i64>("age");

        let err = Query::select([age.avg().into_expr()])
            .from(&m)
            .having(age.avg().gt(20.0))
            .build()
            .expect_err("having without group-by");
        assert_eq!(err, BuildError::HavingWithoutGroupBy);

        let plan = Query::select([age.expr(), count_all().into_expr()])
            .from(&m)
            .group_by([age.expr()])
            .having(age.avg().gt(20.0))
            .build()
            .expect("grouped having");
        assert!(plan.having.is_some());
    }

    #[test]
    fn test_aggregate_in_filter_rejected() {
        let m = member();
        let age = m.field::<i64>("age");
        let err = Query::entity(&m)
            .filter(age.avg().gt(20.0))
            .build()
            .expect_err("aggregate in filter");
        assert_eq!(
            err,
            BuildError::MisplacedAggregate { context: "filter" }
        );
    }

    #[test]
    fn test_fetch_join_recorded() {
        let m = member();
        let t = team();
        let plan = Query::entity(&m)
            .fetch_join(m.rel("team"), &t)
            .build()
            .expect("valid plan");
        assert_eq!(plan.joins.len(), 1);
        assert_eq!(plan.joins[0].kind, JoinKind::Fetch);
        assert_eq!(plan.joins[0].path(), "m.team");
    }

    #[test]
    fn test_from_subquery_builds() {
        let m = member();
        let sub = Query::select([m.field::<i64>("age").expr()])
            .from(&m)
            .build()
            .expect("inner plan");
        let plan = Query::select([Expr::field("sq", "age")])
            .from_subquery(sub, "sq")
            .build()
            .expect("source-position subqueries build; the resolver rejects them");
        assert!(matches!(plan.sources[0], Source::Subquery { .. }));
    }
}
