//! Rebuilding entities and tuples from raw rows.
//!
//! Entity rows deduplicate by root identity in first-seen order; fetch
//! spans then link child instances onto their owners. Tuple rows map 1:1.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};

use relq_model::Value;

use super::entity::MaterializedEntity;
use super::results::Tuple;
use crate::exec::Row;
use crate::translate::{EntitySpan, FetchSpan};

/// Rebuild root entities from rows shaped by `root` and `fetched`.
///
/// A join fan-out repeats the root's columns across rows; the first
/// occurrence of each identity wins and later ones only contribute to
/// fetched collections. Spans attach deepest first, so a fetch whose owner
/// is itself fetched lands inside the finished owner.
pub(crate) fn entities(
    rows: &[Row],
    root: &EntitySpan,
    fetched: &[FetchSpan],
) -> Vec<MaterializedEntity> {
    let mut instances: HashMap<&str, Instances> = HashMap::new();
    instances.insert(root.alias.as_str(), Instances::default());
    for fetch in fetched {
        instances.insert(fetch.span.alias.as_str(), Instances::default());
    }
    let mut links: Vec<LinkSet> = fetched.iter().map(|_| LinkSet::default()).collect();

    let identity_col_of: HashMap<&str, usize> = std::iter::once((root.alias.as_str(), root.identity_col))
        .chain(
            fetched
                .iter()
                .map(|f| (f.span.alias.as_str(), f.span.identity_col)),
        )
        .collect();

    for row in rows {
        collect(row, root, &mut instances);
        for fetch in fetched {
            collect(row, &fetch.span, &mut instances);
        }
        for (index, fetch) in fetched.iter().enumerate() {
            let owner = identity_col_of
                .get(fetch.owner_alias.as_str())
                .and_then(|col| identity_key(row, *col));
            let child = identity_key(row, fetch.span.identity_col);
            if let (Some(owner), Some(child)) = (owner, child) {
                links[index].record(owner, child);
            }
        }
    }

    // Deepest spans first: owners are still flat when their children land.
    for (index, fetch) in fetched.iter().enumerate().rev() {
        let children = instances
            .remove(fetch.span.alias.as_str())
            .unwrap_or_default();
        let owners = match instances.get_mut(fetch.owner_alias.as_str()) {
            Some(owners) => owners,
            None => continue,
        };
        for key in &owners.order {
            if let Some(owner) = owners.by_key.get_mut(key) {
                owner.init_relation(&fetch.relation, fetch.to_many);
            }
        }
        for (owner_key, child_key) in &links[index].ordered {
            let child = match children.by_key.get(child_key) {
                Some(child) => child.clone(),
                None => continue,
            };
            if let Some(owner) = owners.by_key.get_mut(owner_key) {
                owner.attach(&fetch.relation, child, fetch.to_many);
            }
        }
    }

    let Instances { order, mut by_key } = instances.remove(root.alias.as_str()).unwrap_or_default();
    order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect()
}

/// Wrap projected rows 1:1.
pub(crate) fn tuples(rows: Vec<Row>) -> Vec<Tuple> {
    rows.into_iter().map(Tuple::new).collect()
}

fn collect<'a>(row: &Row, span: &'a EntitySpan, instances: &mut HashMap<&'a str, Instances>) {
    let key = match identity_key(row, span.identity_col) {
        Some(key) => key,
        // Null identity: the alias was padded by an outer join.
        None => return,
    };
    let table = match instances.get_mut(span.alias.as_str()) {
        Some(table) => table,
        None => return,
    };
    if table.by_key.contains_key(&key) {
        return;
    }
    let mut values = BTreeMap::new();
    for (field, column) in span.fields.iter().zip(&span.columns) {
        let value = row.get(*column).cloned().unwrap_or(Value::Null);
        values.insert(field.clone(), value);
    }
    let entity = MaterializedEntity::new(span.entity.clone(), key.0.clone(), values);
    table.order.push(key.clone());
    table.by_key.insert(key, entity);
}

fn identity_key(row: &Row, column: usize) -> Option<IdentityKey> {
    match row.get(column) {
        None | Some(Value::Null) => None,
        Some(value) => Some(IdentityKey(value.clone())),
    }
}

/// Instances of one alias, keyed by identity, in first-seen order.
#[derive(Default)]
struct Instances {
    order: Vec<IdentityKey>,
    by_key: HashMap<IdentityKey, MaterializedEntity>,
}

/// Owner-to-child links for one fetch span, deduplicated, in first-seen
/// order.
#[derive(Default)]
struct LinkSet {
    ordered: Vec<(IdentityKey, IdentityKey)>,
    seen: HashSet<(IdentityKey, IdentityKey)>,
}

impl LinkSet {
    fn record(&mut self, owner: IdentityKey, child: IdentityKey) {
        let link = (owner, child);
        if self.seen.insert(link.clone()) {
            self.ordered.push(link);
        }
    }
}

/// An identity value usable as a map key. Floats key by bit pattern.
#[derive(Debug, Clone)]
struct IdentityKey(Value);

impl PartialEq for IdentityKey {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Value::Float32(l), Value::Float32(r)) => l.to_bits() == r.to_bits(),
            (Value::Float64(l), Value::Float64(r)) => l.to_bits() == r.to_bits(),
            (l, r) => l == r,
        }
    }
}

impl Eq for IdentityKey {}

impl Hash for IdentityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Null => state.write_u8(0),
            Value::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Value::Int32(i) => {
                state.write_u8(2);
                i.hash(state);
            }
            Value::Int64(i) => {
                state.write_u8(3);
                i.hash(state);
            }
            Value::Float32(f) => {
                state.write_u8(4);
                f.to_bits().hash(state);
            }
            Value::Float64(f) => {
                state.write_u8(5);
                f.to_bits().hash(state);
            }
            Value::String(s) => {
                state.write_u8(6);
                s.hash(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member_span() -> EntitySpan {
        EntitySpan {
            alias: "m".to_string(),
            entity: "Member".to_string(),
            fields: vec!["id".to_string(), "name".to_string()],
            columns: vec![0, 1],
            identity_col: 0,
        }
    }

    fn team_fetch(owner: &str, to_many: bool) -> FetchSpan {
        FetchSpan {
            span: EntitySpan {
                alias: "t".to_string(),
                entity: "Team".to_string(),
                fields: vec!["id".to_string(), "name".to_string()],
                columns: vec![2, 3],
                identity_col: 2,
            },
            owner_alias: owner.to_string(),
            relation: if to_many { "members" } else { "team" }.to_string(),
            to_many,
        }
    }

    #[test]
    fn test_roots_dedup_in_first_seen_order() {
        let rows = vec![
            vec![Value::Int64(2), Value::from("member2")],
            vec![Value::Int64(1), Value::from("member1")],
            vec![Value::Int64(2), Value::from("member2")],
        ];
        let roots = entities(&rows, &member_span(), &[]);
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].identity(), &Value::Int64(2));
        assert_eq!(roots[1].identity(), &Value::Int64(1));
        assert_eq!(roots[0].str("name"), Some("member2"));
    }

    #[test]
    fn test_to_one_fetch_attaches_shared_target() {
        let rows = vec![
            vec![
                Value::Int64(1),
                Value::from("member1"),
                Value::Int64(10),
                Value::from("teamA"),
            ],
            vec![
                Value::Int64(2),
                Value::from("member2"),
                Value::Int64(10),
                Value::from("teamA"),
            ],
        ];
        let fetched = vec![team_fetch("m", false)];
        let roots = entities(&rows, &member_span(), &fetched);
        assert_eq!(roots.len(), 2);
        for root in &roots {
            let team = root.one("team").unwrap();
            assert_eq!(team.str("name"), Some("teamA"));
        }
    }

    #[test]
    fn test_to_one_fetch_null_padded_stays_empty() {
        let rows = vec![vec![
            Value::Int64(1),
            Value::from("member1"),
            Value::Null,
            Value::Null,
        ]];
        let fetched = vec![team_fetch("m", false)];
        let roots = entities(&rows, &member_span(), &fetched);
        assert_eq!(roots.len(), 1);
        assert!(roots[0].is_loaded("team"));
        assert_eq!(roots[0].one("team"), None);
    }

    #[test]
    fn test_collection_fetch_groups_children() {
        // Teams as roots, members fetched: the fan-out repeats each team row.
        let team_root = EntitySpan {
            alias: "t".to_string(),
            entity: "Team".to_string(),
            fields: vec!["id".to_string(), "name".to_string()],
            columns: vec![0, 1],
            identity_col: 0,
        };
        let member_fetch = FetchSpan {
            span: EntitySpan {
                alias: "m".to_string(),
                entity: "Member".to_string(),
                fields: vec!["id".to_string(), "name".to_string()],
                columns: vec![2, 3],
                identity_col: 2,
            },
            owner_alias: "t".to_string(),
            relation: "members".to_string(),
            to_many: true,
        };
        let rows = vec![
            vec![
                Value::Int64(10),
                Value::from("teamA"),
                Value::Int64(1),
                Value::from("member1"),
            ],
            vec![
                Value::Int64(10),
                Value::from("teamA"),
                Value::Int64(2),
                Value::from("member2"),
            ],
            vec![Value::Int64(11), Value::from("teamB"), Value::Null, Value::Null],
        ];
        let roots = entities(&rows, &team_root, &[member_fetch]);
        assert_eq!(roots.len(), 2);

        let team_a = &roots[0];
        let names: Vec<_> = team_a
            .many("members")
            .unwrap()
            .iter()
            .map(|m| m.str("name").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["member1", "member2"]);

        let team_b = &roots[1];
        assert!(team_b.is_loaded("members"));
        assert!(team_b.many("members").unwrap().is_empty());
    }

    #[test]
    fn test_nested_fetch_lands_inside_owner() {
        // Member -> team -> that team's members.
        let member_root = member_span();
        let team = team_fetch("m", false);
        let teammate = FetchSpan {
            span: EntitySpan {
                alias: "tm".to_string(),
                entity: "Member".to_string(),
                fields: vec!["id".to_string(), "name".to_string()],
                columns: vec![4, 5],
                identity_col: 4,
            },
            owner_alias: "t".to_string(),
            relation: "members".to_string(),
            to_many: true,
        };
        let rows = vec![
            vec![
                Value::Int64(1),
                Value::from("member1"),
                Value::Int64(10),
                Value::from("teamA"),
                Value::Int64(1),
                Value::from("member1"),
            ],
            vec![
                Value::Int64(1),
                Value::from("member1"),
                Value::Int64(10),
                Value::from("teamA"),
                Value::Int64(2),
                Value::from("member2"),
            ],
        ];
        let roots = entities(&rows, &member_root, &[team, teammate]);
        assert_eq!(roots.len(), 1);
        assert!(roots[0].is_loaded("team.members"));
        let team = roots[0].one("team").unwrap();
        assert_eq!(team.many("members").unwrap().len(), 2);
    }

    #[test]
    fn test_tuples_map_one_to_one() {
        let rows = vec![
            vec![Value::from("teamA"), Value::Float64(15.0)],
            vec![Value::from("teamA"), Value::Float64(15.0)],
        ];
        let tuples = tuples(rows);
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[0].get(1), Some(&Value::Float64(15.0)));
    }
}
