//! SQL text rendering for translated queries.
//!
//! The rendered text uses `$n` placeholders for bound parameters; values
//! never appear inline. Executors backed by a SQL engine can hand this text
//! and the parameter list to their driver; the in-memory executor ignores it
//! and interprets the structured form directly.

use relq_model::{Direction, NullPlacement, UnaryOp};

use super::{ScalarOp, TranslatedJoinKind, TranslatedQuery};

impl TranslatedQuery {
    /// Render this query as SQL text with positional placeholders.
    pub fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&join_ops(&self.projection));

        sql.push_str(" FROM ");
        let sources: Vec<String> = self
            .sources
            .iter()
            .map(|s| format!("{} {}", s.entity, s.alias))
            .collect();
        sql.push_str(&sources.join(", "));

        for join in &self.joins {
            let keyword = match join.kind {
                TranslatedJoinKind::Inner => "JOIN",
                TranslatedJoinKind::LeftOuter => "LEFT JOIN",
            };
            sql.push_str(&format!(
                " {} {} {} ON {}",
                keyword,
                join.target.entity,
                join.target.alias,
                render_op(&join.on)
            ));
        }

        if let Some(filter) = &self.filter {
            sql.push_str(&format!(" WHERE {}", render_op(filter)));
        }
        if !self.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", join_ops(&self.group_by)));
        }
        if let Some(having) = &self.having {
            sql.push_str(&format!(" HAVING {}", render_op(having)));
        }
        if !self.order_by.is_empty() {
            let keys: Vec<String> = self
                .order_by
                .iter()
                .map(|key| {
                    let mut rendered = render_op(&key.expr);
                    rendered.push_str(match key.direction {
                        Direction::Asc => " ASC",
                        Direction::Desc => " DESC",
                    });
                    match key.nulls {
                        NullPlacement::Default => {}
                        NullPlacement::NullsFirst => rendered.push_str(" NULLS FIRST"),
                        NullPlacement::NullsLast => rendered.push_str(" NULLS LAST"),
                    }
                    rendered
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", keys.join(", ")));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        sql
    }
}

fn join_ops(ops: &[ScalarOp]) -> String {
    let rendered: Vec<String> = ops.iter().map(render_op).collect();
    rendered.join(", ")
}

fn render_op(op: &ScalarOp) -> String {
    match op {
        ScalarOp::Column { alias, field } => format!("{alias}.{field}"),
        ScalarOp::Param(index) => format!("${}", index + 1),
        ScalarOp::Binary { op, lhs, rhs } => {
            format!("({} {} {})", render_op(lhs), op.symbol(), render_op(rhs))
        }
        ScalarOp::Unary {
            op: UnaryOp::Not,
            expr,
        } => format!("(not {})", render_op(expr)),
        ScalarOp::Unary {
            op: UnaryOp::IsNull,
            expr,
        } => format!("{} is null", render_op(expr)),
        ScalarOp::Unary {
            op: UnaryOp::IsNotNull,
            expr,
        } => format!("{} is not null", render_op(expr)),
        ScalarOp::List(items) => {
            let rendered: Vec<String> = items.iter().map(render_op).collect();
            format!("({})", rendered.join(", "))
        }
        ScalarOp::Aggregate {
            func,
            arg,
            distinct,
        } => match arg {
            Some(arg) if *distinct => format!("{}(distinct {})", func.name(), render_op(arg)),
            Some(arg) => format!("{}({})", func.name(), render_op(arg)),
            None => format!("{}(*)", func.name()),
        },
        ScalarOp::Subquery(query) => format!("({})", query.to_sql()),
    }
}
