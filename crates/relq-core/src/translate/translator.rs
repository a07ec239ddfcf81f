//! The translator: resolved plans to executable queries.

use tracing::{debug, warn};

use relq_model::{
    AggregateFunc, BinaryOp, EntityDef, Expr, JoinKind, Model, Pagination, Projection, Source,
};

use super::{
    BoundParams, EntitySpan, FetchSpan, OrderKey, RowShape, ScalarOp, SourceRef, TranslatedJoin,
    TranslatedJoinKind, TranslatedQuery, Translation,
};
use crate::error::ResolutionError;
use crate::resolve::{ResolvedPlan, Resolver};

/// Lowers resolved plans into executable queries.
pub struct Translator<'a> {
    model: &'a Model,
}

impl<'a> Translator<'a> {
    /// Create a translator over the given model.
    pub fn new(model: &'a Model) -> Self {
        Translator { model }
    }

    /// Translate a resolved plan into an executable query, its bound
    /// parameters, and the row shape for materialization.
    pub fn translate(&self, resolved: &ResolvedPlan) -> Result<Translation, ResolutionError> {
        let mut params = BoundParams::new();
        let (query, shape) = self.translate_plan(resolved, &mut params)?;
        if let RowShape::Entity {
            deferred_page: Some(_),
            ..
        } = &shape
        {
            warn!(
                root = query.sources[0].alias.as_str(),
                "Pagination with a collection fetch is applied in memory after deduplication"
            );
        }
        debug!(
            joins = query.joins.len(),
            params = params.len(),
            "Translated query plan"
        );
        Ok(Translation {
            query,
            params,
            shape,
        })
    }

    /// Derive the companion count query for the same plan.
    ///
    /// Same sources, joins, and filter; projection replaced by a single
    /// count; ordering and pagination stripped. Entity projections count
    /// distinct root identities so to-many fan-out cannot inflate the total.
    /// Grouped plans keep their grouping and the caller reads the number of
    /// result rows as the total.
    pub fn translate_count(&self, resolved: &ResolvedPlan) -> Result<Translation, ResolutionError> {
        let mut params = BoundParams::new();
        let (mut query, _) = self.translate_plan(resolved, &mut params)?;

        let count = match &resolved.plan.projection {
            Projection::Entity { alias, .. } => {
                let binding = resolved.binding(alias).ok_or_else(|| {
                    ResolutionError::InvalidPlan(format!("alias '{alias}' is not declared"))
                })?;
                ScalarOp::Aggregate {
                    func: AggregateFunc::Count,
                    arg: Some(Box::new(ScalarOp::Column {
                        alias: alias.clone(),
                        field: binding.entity.identity_field.clone(),
                    })),
                    distinct: true,
                }
            }
            Projection::Exprs(_) => ScalarOp::Aggregate {
                func: AggregateFunc::Count,
                arg: None,
                distinct: false,
            },
        };

        query.projection = vec![count];
        query.distinct = false;
        query.order_by.clear();
        query.offset = None;
        query.limit = None;

        Ok(Translation {
            query,
            params,
            shape: RowShape::Tuple { width: 1 },
        })
    }

    fn translate_plan(
        &self,
        resolved: &ResolvedPlan,
        params: &mut BoundParams,
    ) -> Result<(TranslatedQuery, RowShape), ResolutionError> {
        let plan = &resolved.plan;

        let mut sources = Vec::new();
        for source in &plan.sources {
            match source {
                Source::Entity { entity, alias } => sources.push(SourceRef {
                    entity: entity.clone(),
                    alias: alias.clone(),
                }),
                Source::Subquery { alias, .. } => {
                    return Err(ResolutionError::SubqueryAsSource {
                        alias: alias.clone(),
                    });
                }
            }
        }

        let mut joins = Vec::new();
        let mut hoisted: Vec<ScalarOp> = Vec::new();
        for join in &plan.joins {
            let target = SourceRef {
                entity: join.entity.clone(),
                alias: join.alias.clone(),
            };
            match &join.relation {
                Some(rel) => {
                    let source_entity = resolved
                        .binding(&rel.source_alias)
                        .map(|b| b.entity.name.clone())
                        .ok_or_else(|| {
                            ResolutionError::InvalidPlan(format!(
                                "alias '{}' is not declared",
                                rel.source_alias
                            ))
                        })?;
                    let relation = self
                        .model
                        .get_relation(&source_entity, &rel.relation)
                        .ok_or_else(|| ResolutionError::UnknownRelation {
                            entity: source_entity.clone(),
                            relation: rel.relation.clone(),
                        })?;
                    let key = ScalarOp::Binary {
                        op: BinaryOp::Eq,
                        lhs: Box::new(ScalarOp::Column {
                            alias: rel.source_alias.clone(),
                            field: relation.source_field.clone(),
                        }),
                        rhs: Box::new(ScalarOp::Column {
                            alias: join.alias.clone(),
                            field: relation.target_field.clone(),
                        }),
                    };
                    let user = join
                        .on
                        .as_ref()
                        .map(|p| self.translate_expr(p.expr(), params))
                        .transpose()?;
                    match join.kind {
                        JoinKind::Plain | JoinKind::Fetch => {
                            // Inner correlation through on or filter is
                            // result-equivalent; hoisting keeps the join
                            // condition down to the key equality.
                            if let Some(user) = user {
                                hoisted.push(user);
                            }
                            joins.push(TranslatedJoin {
                                target,
                                kind: TranslatedJoinKind::Inner,
                                on: key,
                            });
                        }
                        JoinKind::LeftOuter => {
                            let on = match user {
                                Some(user) => and(key, user),
                                None => key,
                            };
                            joins.push(TranslatedJoin {
                                target,
                                kind: TranslatedJoinKind::LeftOuter,
                                on,
                            });
                        }
                    }
                }
                None => {
                    let on = join
                        .on
                        .as_ref()
                        .map(|p| self.translate_expr(p.expr(), params))
                        .transpose()?
                        .ok_or_else(|| {
                            ResolutionError::InvalidPlan(format!(
                                "outer join to unrelated alias '{}' requires an on predicate",
                                join.alias
                            ))
                        })?;
                    joins.push(TranslatedJoin {
                        target,
                        kind: TranslatedJoinKind::LeftOuter,
                        on,
                    });
                }
            }
        }

        let mut filter_ops: Vec<ScalarOp> = Vec::new();
        if let Some(filter) = &plan.filter {
            filter_ops.push(self.translate_expr(filter.expr(), params)?);
        }
        filter_ops.extend(hoisted);
        let filter = filter_ops.into_iter().reduce(and);

        let (projection, distinct, shape, page) = match &plan.projection {
            Projection::Entity { alias, distinct } => {
                let binding = resolved.binding(alias).ok_or_else(|| {
                    ResolutionError::InvalidPlan(format!("alias '{alias}' is not declared"))
                })?;
                let mut next_col = 0usize;
                let (root_span, mut ops) = entity_span(alias, &binding.entity, &mut next_col)?;

                let mut fetched = Vec::new();
                for fetch in &resolved.fetched {
                    let target = resolved.binding(&fetch.target_alias).ok_or_else(|| {
                        ResolutionError::InvalidPlan(format!(
                            "alias '{}' is not declared",
                            fetch.target_alias
                        ))
                    })?;
                    let (span, span_ops) =
                        entity_span(&fetch.target_alias, &target.entity, &mut next_col)?;
                    ops.extend(span_ops);
                    fetched.push(FetchSpan {
                        span,
                        owner_alias: fetch.source_alias.clone(),
                        relation: fetch.relation.name.clone(),
                        to_many: fetch.relation.is_to_many(),
                    });
                }

                let defer = plan.pagination.is_paged() && fetched.iter().any(|f| f.to_many);
                let (deferred_page, page) = if defer {
                    (Some(plan.pagination), Pagination::default())
                } else {
                    (None, plan.pagination)
                };
                (
                    ops,
                    *distinct,
                    RowShape::Entity {
                        root: root_span,
                        fetched,
                        deferred_page,
                    },
                    page,
                )
            }
            Projection::Exprs(exprs) => {
                let ops = exprs
                    .iter()
                    .map(|e| self.translate_expr(e, params))
                    .collect::<Result<Vec<_>, _>>()?;
                let width = ops.len();
                (ops, false, RowShape::Tuple { width }, plan.pagination)
            }
        };

        let group_by = plan
            .group_by
            .iter()
            .map(|k| self.translate_expr(k, params))
            .collect::<Result<Vec<_>, _>>()?;
        let having = plan
            .having
            .as_ref()
            .map(|h| self.translate_expr(h.expr(), params))
            .transpose()?;
        let order_by = plan
            .order_by
            .iter()
            .map(|s| {
                Ok(OrderKey {
                    expr: self.translate_expr(&s.expr, params)?,
                    direction: s.direction,
                    nulls: s.nulls,
                })
            })
            .collect::<Result<Vec<_>, ResolutionError>>()?;

        Ok((
            TranslatedQuery {
                sources,
                joins,
                projection,
                distinct,
                filter,
                group_by,
                having,
                order_by,
                offset: page.offset,
                limit: page.limit,
            },
            shape,
        ))
    }

    fn translate_expr(
        &self,
        expr: &Expr,
        params: &mut BoundParams,
    ) -> Result<ScalarOp, ResolutionError> {
        match expr {
            Expr::Literal(value) => Ok(ScalarOp::Param(params.push(value.clone()))),
            Expr::Field { alias, field, .. } => Ok(ScalarOp::Column {
                alias: alias.clone(),
                field: field.clone(),
            }),
            Expr::Binary { op, lhs, rhs } => Ok(ScalarOp::Binary {
                op: *op,
                lhs: Box::new(self.translate_expr(lhs, params)?),
                rhs: Box::new(self.translate_expr(rhs, params)?),
            }),
            Expr::Unary { op, expr } => Ok(ScalarOp::Unary {
                op: *op,
                expr: Box::new(self.translate_expr(expr, params)?),
            }),
            Expr::List(items) => Ok(ScalarOp::List(
                items
                    .iter()
                    .map(|i| self.translate_expr(i, params))
                    .collect::<Result<_, _>>()?,
            )),
            Expr::Aggregate { func, arg } => {
                let arg = match arg {
                    Some(arg) => Some(Box::new(self.translate_expr(arg, params)?)),
                    None => None,
                };
                Ok(ScalarOp::Aggregate {
                    func: *func,
                    arg,
                    distinct: false,
                })
            }
            Expr::Subquery(plan) => {
                // Subqueries share the outer parameter list, so one binding
                // pass covers the whole nested tree.
                let resolved = Resolver::new(self.model).resolve((**plan).clone())?;
                let (query, _) = self.translate_plan(&resolved, params)?;
                Ok(ScalarOp::Subquery(Box::new(query)))
            }
        }
    }
}

fn and(lhs: ScalarOp, rhs: ScalarOp) -> ScalarOp {
    ScalarOp::Binary {
        op: BinaryOp::And,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// Project every field of an entity, assigning row positions from
/// `next_col` on.
fn entity_span(
    alias: &str,
    entity: &EntityDef,
    next_col: &mut usize,
) -> Result<(EntitySpan, Vec<ScalarOp>), ResolutionError> {
    let mut fields = Vec::new();
    let mut columns = Vec::new();
    let mut ops = Vec::new();
    let mut identity_col = None;
    for field in &entity.fields {
        if field.name == entity.identity_field {
            identity_col = Some(*next_col);
        }
        fields.push(field.name.clone());
        columns.push(*next_col);
        ops.push(ScalarOp::Column {
            alias: alias.to_string(),
            field: field.name.clone(),
        });
        *next_col += 1;
    }
    let identity_col = identity_col.ok_or_else(|| {
        ResolutionError::InvalidPlan(format!(
            "entity '{}' does not declare its identity field '{}'",
            entity.name, entity.identity_field
        ))
    })?;
    Ok((
        EntitySpan {
            alias: alias.to_string(),
            entity: entity.name.clone(),
            fields,
            columns,
            identity_col,
        },
        ops,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relq_model::{EntityAlias, FieldDef, Query, RelationDef, ScalarType, Subquery, Value};

    fn sample_model() -> Model {
        Model::new()
            .with_entity(
                EntityDef::new("Team", "id")
                    .with_field(FieldDef::new("id", ScalarType::Int64))
                    .with_field(FieldDef::new("name", ScalarType::String)),
            )
            .with_entity(
                EntityDef::new("Member", "id")
                    .with_field(FieldDef::new("id", ScalarType::Int64))
                    .with_field(FieldDef::optional("name", ScalarType::String))
                    .with_field(FieldDef::new("age", ScalarType::Int64))
                    .with_field(FieldDef::optional("team_id", ScalarType::Int64)),
            )
            .with_relation(RelationDef::to_one("team", "Member", "Team", "team_id", "id"))
            .with_relation(RelationDef::to_many(
                "members", "Team", "Member", "id", "team_id",
            ))
    }

    fn translate(model: &Model, plan: relq_model::QueryPlan) -> Translation {
        let resolved = Resolver::new(model).resolve(plan).unwrap();
        Translator::new(model).translate(&resolved).unwrap()
    }

    #[test]
    fn test_literals_become_params() {
        let model = sample_model();
        let m = EntityAlias::new("Member", "m");
        let plan = Query::entity(&m)
            .filter(m.field::<i64>("age").goe(30))
            .filter(m.field::<String>("name").eq("member1"))
            .build()
            .unwrap();

        let translation = translate(&model, plan);
        assert_eq!(
            translation.params.values(),
            &[Value::Int64(30), Value::from("member1")]
        );
        // The filter tree references slots, not values.
        let filter = translation.query.filter.expect("filter present");
        let rendered = format!("{filter:?}");
        assert!(rendered.contains("Param(0)"));
        assert!(rendered.contains("Param(1)"));
    }

    #[test]
    fn test_entity_projection_expands_columns() {
        let model = sample_model();
        let m = EntityAlias::new("Member", "m");
        let plan = Query::entity(&m).build().unwrap();

        let translation = translate(&model, plan);
        assert_eq!(translation.query.projection.len(), 4);
        match translation.shape {
            RowShape::Entity { root, fetched, .. } => {
                assert_eq!(root.alias, "m");
                assert_eq!(root.identity_col, 0);
                assert_eq!(root.fields, vec!["id", "name", "age", "team_id"]);
                assert!(fetched.is_empty());
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_fetch_join_expands_projection() {
        let model = sample_model();
        let m = EntityAlias::new("Member", "m");
        let t = EntityAlias::new("Team", "t");
        let plan = Query::entity(&m)
            .fetch_join(m.rel("team"), &t)
            .build()
            .unwrap();

        let translation = translate(&model, plan);
        assert_eq!(translation.query.projection.len(), 6);
        assert_eq!(translation.query.joins.len(), 1);
        assert_eq!(translation.query.joins[0].kind, TranslatedJoinKind::Inner);
        match translation.shape {
            RowShape::Entity { fetched, .. } => {
                assert_eq!(fetched.len(), 1);
                assert_eq!(fetched[0].span.alias, "t");
                assert_eq!(fetched[0].span.columns, vec![4, 5]);
                assert_eq!(fetched[0].span.identity_col, 4);
                assert!(!fetched[0].to_many);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_relationship_join_key() {
        let model = sample_model();
        let m = EntityAlias::new("Member", "m");
        let t = EntityAlias::new("Team", "t");
        let plan = Query::entity(&m).join(m.rel("team"), &t).build().unwrap();

        let translation = translate(&model, plan);
        let join = &translation.query.joins[0];
        assert_eq!(
            join.on,
            ScalarOp::Binary {
                op: BinaryOp::Eq,
                lhs: Box::new(ScalarOp::Column {
                    alias: "m".to_string(),
                    field: "team_id".to_string(),
                }),
                rhs: Box::new(ScalarOp::Column {
                    alias: "t".to_string(),
                    field: "id".to_string(),
                }),
            }
        );
    }

    #[test]
    fn test_inner_on_hoisted_to_filter() {
        let model = sample_model();
        let m = EntityAlias::new("Member", "m");
        let t = EntityAlias::new("Team", "t");
        let plan = Query::entity(&m)
            .join_on(m.rel("team"), &t, t.field::<String>("name").eq("teamA"))
            .build()
            .unwrap();

        let translation = translate(&model, plan);
        // The join keeps the key equality only; the user condition moved to
        // the filter.
        let join_rendered = format!("{:?}", translation.query.joins[0].on);
        assert!(!join_rendered.contains("Param"));
        let filter = translation.query.filter.expect("hoisted condition");
        assert!(format!("{filter:?}").contains("Param(0)"));
    }

    #[test]
    fn test_outer_on_stays_on_join() {
        let model = sample_model();
        let m = EntityAlias::new("Member", "m");
        let t = EntityAlias::new("Team", "t");
        let plan = Query::entity(&m)
            .left_join_on(m.rel("team"), &t, t.field::<String>("name").eq("teamA"))
            .build()
            .unwrap();

        let translation = translate(&model, plan);
        assert_eq!(
            translation.query.joins[0].kind,
            TranslatedJoinKind::LeftOuter
        );
        let join_rendered = format!("{:?}", translation.query.joins[0].on);
        assert!(join_rendered.contains("Param(0)"));
        assert!(translation.query.filter.is_none());
    }

    #[test]
    fn test_subquery_shares_params() {
        let model = sample_model();
        let m = EntityAlias::new("Member", "m");
        let ms = EntityAlias::new("Member", "ms");
        let sub = Query::select([ms.field::<i64>("age").avg().into_expr()])
            .from(&ms)
            .filter(ms.field::<i64>("age").gt(0))
            .build()
            .unwrap();
        let plan = Query::entity(&m)
            .filter(m.field::<String>("name").eq("member1"))
            .filter(m.field::<i64>("age").goe(Subquery::scalar(sub)))
            .build()
            .unwrap();

        let translation = translate(&model, plan);
        // Outer literal first, then the subquery's, in one list.
        assert_eq!(
            translation.params.values(),
            &[Value::from("member1"), Value::Int64(0)]
        );
    }

    #[test]
    fn test_count_companion_for_entities() {
        let model = sample_model();
        let m = EntityAlias::new("Member", "m");
        let t = EntityAlias::new("Team", "t");
        let plan = Query::entity(&m)
            .fetch_join(m.rel("team"), &t)
            .filter(m.field::<i64>("age").goe(20))
            .order_by(m.field::<i64>("age").desc())
            .offset(1)
            .limit(2)
            .build()
            .unwrap();

        let resolved = Resolver::new(&model).resolve(plan).unwrap();
        let count = Translator::new(&model).translate_count(&resolved).unwrap();
        assert_eq!(
            count.query.projection,
            vec![ScalarOp::Aggregate {
                func: AggregateFunc::Count,
                arg: Some(Box::new(ScalarOp::Column {
                    alias: "m".to_string(),
                    field: "id".to_string(),
                })),
                distinct: true,
            }]
        );
        assert!(count.query.order_by.is_empty());
        assert_eq!(count.query.limit, None);
        assert_eq!(count.query.offset, None);
        // The filter survives into the companion.
        assert!(count.query.filter.is_some());
    }

    #[test]
    fn test_count_companion_for_tuples() {
        let model = sample_model();
        let m = EntityAlias::new("Member", "m");
        let plan = Query::select([m.field::<i64>("age").expr()])
            .from(&m)
            .build()
            .unwrap();

        let resolved = Resolver::new(&model).resolve(plan).unwrap();
        let count = Translator::new(&model).translate_count(&resolved).unwrap();
        assert_eq!(
            count.query.projection,
            vec![ScalarOp::Aggregate {
                func: AggregateFunc::Count,
                arg: None,
                distinct: false,
            }]
        );
    }

    #[test]
    fn test_pagination_deferred_under_collection_fetch() {
        let model = sample_model();
        let t = EntityAlias::new("Team", "t");
        let m = EntityAlias::new("Member", "m");
        let plan = Query::entity(&t)
            .fetch_join(t.rel("members"), &m)
            .order_by(t.field::<String>("name").asc())
            .limit(1)
            .build()
            .unwrap();

        let translation = translate(&model, plan);
        assert_eq!(translation.query.limit, None);
        match translation.shape {
            RowShape::Entity { deferred_page, .. } => {
                let page = deferred_page.expect("deferred");
                assert_eq!(page.limit, Some(1));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_pagination_kept_without_collection_fetch() {
        let model = sample_model();
        let m = EntityAlias::new("Member", "m");
        let t = EntityAlias::new("Team", "t");
        let plan = Query::entity(&m)
            .fetch_join(m.rel("team"), &t)
            .order_by(m.field::<i64>("age").asc())
            .limit(2)
            .build()
            .unwrap();

        let translation = translate(&model, plan);
        assert_eq!(translation.query.limit, Some(2));
        match translation.shape {
            RowShape::Entity { deferred_page, .. } => assert!(deferred_page.is_none()),
            other => panic!("unexpected shape: {other:?}"),
        }
    }
}
