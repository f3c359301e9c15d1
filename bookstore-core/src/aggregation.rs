// bookstore-core/src/aggregation.rs
// Aggregation pipeline evaluation for the in-memory store

use crate::error::{CatalogError, Result};
use crate::find_options::{apply_skip_limit, apply_sort, SortDirection};
use crate::query::matches_filter;
use crate::value_utils::{canonical_json_string, get_nested_value, set_nested_value, sort_order};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

fn agg_error(msg: impl Into<String>) -> CatalogError {
    CatalogError::store(msg)
}

/// Aggregation pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

/// Pipeline stage
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Value),
    AddFields(Vec<(String, Expression)>),
    Group(GroupStage),
    Project(ProjectStage),
    Sort(Vec<(String, SortDirection)>),
    Skip(u64),
    Limit(u64),
}

/// Aggregation expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// "$field.path"
    Field(String),
    Literal(Value),
    Add(Vec<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Vec<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Floor(Box<Expression>),
}

/// $group stage
#[derive(Debug, Clone)]
pub struct GroupStage {
    id: Expression,
    accumulators: Vec<(String, Accumulator)>,
}

#[derive(Debug, Clone)]
pub enum Accumulator {
    Sum(Expression),
    Avg(Expression),
    Min(Expression),
    Max(Expression),
}

/// $project stage
#[derive(Debug, Clone)]
pub struct ProjectStage {
    fields: Vec<(String, ProjectField)>,
}

#[derive(Debug, Clone)]
pub enum ProjectField {
    Include,
    Exclude,
    Computed(Expression),
}

impl Pipeline {
    /// Parse a pipeline from its JSON array form
    pub fn from_json(pipeline: &Value) -> Result<Self> {
        let stages = pipeline
            .as_array()
            .ok_or_else(|| agg_error("pipeline must be an array"))?
            .iter()
            .map(Stage::from_json)
            .collect::<Result<Vec<_>>>()?;
        Ok(Pipeline { stages })
    }

    /// Run the stages in order over `docs`
    pub fn execute(&self, mut docs: Vec<Value>) -> Result<Vec<Value>> {
        for stage in &self.stages {
            docs = stage.execute(docs)?;
        }
        Ok(docs)
    }
}

fn positive_count(stage: &str, spec: &Value) -> Result<u64> {
    match spec.as_f64() {
        Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as u64),
        _ => Err(agg_error(format!(
            "invalid argument to {} stage: expected a non-negative integer",
            stage
        ))),
    }
}

impl Stage {
    fn from_json(stage: &Value) -> Result<Self> {
        let obj = stage
            .as_object()
            .ok_or_else(|| agg_error("each pipeline stage must be an object"))?;
        if obj.len() != 1 {
            return Err(agg_error(
                "a pipeline stage specification object must contain exactly one field",
            ));
        }
        let Some((name, spec)) = obj.iter().next() else {
            return Err(agg_error("empty pipeline stage"));
        };

        match name.as_str() {
            "$match" => {
                if !spec.is_object() {
                    return Err(agg_error("the match filter must be an expression in an object"));
                }
                Ok(Stage::Match(spec.clone()))
            }
            "$addFields" | "$set" => {
                let fields = spec
                    .as_object()
                    .ok_or_else(|| agg_error(format!("{} specification must be an object", name)))?
                    .iter()
                    .map(|(field, expr)| -> Result<(String, Expression)> {
                        Ok((field.clone(), Expression::parse(expr)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Stage::AddFields(fields))
            }
            "$group" => Ok(Stage::Group(GroupStage::from_json(spec)?)),
            "$project" => Ok(Stage::Project(ProjectStage::from_json(spec)?)),
            "$sort" => {
                let keys = spec
                    .as_object()
                    .filter(|o| !o.is_empty())
                    .ok_or_else(|| agg_error("$sort key specification must be a nonempty object"))?;
                let sort = keys
                    .iter()
                    .map(|(field, dir)| {
                        SortDirection::from_value(dir)
                            .map(|d| (field.clone(), d))
                            .ok_or_else(|| agg_error("$sort key ordering must be 1 or -1"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Stage::Sort(sort))
            }
            "$skip" => Ok(Stage::Skip(positive_count("$skip", spec)?)),
            "$limit" => match positive_count("$limit", spec)? {
                0 => Err(agg_error("the limit must be positive")),
                n => Ok(Stage::Limit(n)),
            },
            other => Err(agg_error(format!(
                "Unrecognized pipeline stage name: '{}'",
                other
            ))),
        }
    }

    fn execute(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        match self {
            Stage::Match(filter) => {
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches_filter(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                Ok(kept)
            }
            Stage::AddFields(fields) => docs
                .into_iter()
                .map(|mut doc| -> Result<Value> {
                    for (field, expr) in fields {
                        let value = expr.evaluate(&doc)?;
                        set_nested_value(&mut doc, field, value);
                    }
                    Ok(doc)
                })
                .collect(),
            Stage::Group(group) => group.execute(docs),
            Stage::Project(project) => docs.iter().map(|doc| project.apply(doc)).collect(),
            Stage::Sort(sort) => {
                let mut docs = docs;
                apply_sort(&mut docs, sort);
                Ok(docs)
            }
            Stage::Skip(n) => Ok(apply_skip_limit(docs, Some(*n), None)),
            Stage::Limit(n) => Ok(apply_skip_limit(docs, None, Some(*n))),
        }
    }
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn from_value(op: &str, value: &Value) -> Result<Option<Number>> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(Some(match n.as_i64() {
                Some(i) => Number::Int(i),
                None => Number::Float(n.as_f64().unwrap_or(f64::NAN)),
            })),
            other => Err(agg_error(format!(
                "{} only supports numeric types, not {}",
                op,
                type_name(other)
            ))),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::from(i),
            Number::Float(f) => Value::from(f),
        }
    }

    fn combine(self, other: Number, int_op: fn(i64, i64) -> Option<i64>, float_op: fn(f64, f64) -> f64) -> Number {
        if let (Number::Int(a), Number::Int(b)) = (self, other) {
            if let Some(r) = int_op(a, b) {
                return Number::Int(r);
            }
        }
        Number::Float(float_op(self.as_f64(), other.as_f64()))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn expression_args(op: &str, spec: &Value) -> Result<Vec<Expression>> {
    let args = match spec {
        Value::Array(items) => items.iter().map(Expression::parse).collect::<Result<Vec<_>>>()?,
        single => vec![Expression::parse(single)?],
    };
    if args.is_empty() {
        return Err(agg_error(format!("{} needs at least one argument", op)));
    }
    Ok(args)
}

fn exactly<const N: usize>(op: &str, args: Vec<Expression>) -> Result<[Expression; N]> {
    let count = args.len();
    args.try_into().map_err(|_| {
        agg_error(format!(
            "Expression {} takes exactly {} arguments. {} were passed in.",
            op, N, count
        ))
    })
}

impl Expression {
    /// Parse an aggregation expression
    pub fn parse(spec: &Value) -> Result<Self> {
        match spec {
            Value::String(s) if s.starts_with('$') => {
                let path = &s[1..];
                if path.is_empty() {
                    return Err(agg_error("'$' by itself is not a valid field path"));
                }
                Ok(Expression::Field(path.to_string()))
            }
            Value::Object(obj) if obj.len() == 1 && obj.keys().all(|k| k.starts_with('$')) => {
                let Some((op, args)) = obj.iter().next() else {
                    return Ok(Expression::Literal(spec.clone()));
                };
                let op = op.as_str();
                match op {
                    "$literal" => Ok(Expression::Literal(args.clone())),
                    "$add" => Ok(Expression::Add(expression_args(op, args)?)),
                    "$multiply" => Ok(Expression::Multiply(expression_args(op, args)?)),
                    "$subtract" => {
                        let [a, b] = exactly::<2>(op, expression_args(op, args)?)?;
                        Ok(Expression::Subtract(Box::new(a), Box::new(b)))
                    }
                    "$divide" => {
                        let [a, b] = exactly::<2>(op, expression_args(op, args)?)?;
                        Ok(Expression::Divide(Box::new(a), Box::new(b)))
                    }
                    "$floor" => {
                        let [a] = exactly::<1>(op, expression_args(op, args)?)?;
                        Ok(Expression::Floor(Box::new(a)))
                    }
                    other => Err(agg_error(format!(
                        "Unrecognized expression '{}'",
                        other
                    ))),
                }
            }
            literal => Ok(Expression::Literal(literal.clone())),
        }
    }

    /// Evaluate against one document; missing fields evaluate to null
    pub fn evaluate(&self, doc: &Value) -> Result<Value> {
        match self {
            Expression::Field(path) => Ok(get_nested_value(doc, path).cloned().unwrap_or(Value::Null)),
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Add(args) => {
                fold_numeric("$add", args, doc, Number::Int(0), |a, b| {
                    a.combine(b, i64::checked_add, |x, y| x + y)
                })
            }
            Expression::Multiply(args) => {
                fold_numeric("$multiply", args, doc, Number::Int(1), |a, b| {
                    a.combine(b, i64::checked_mul, |x, y| x * y)
                })
            }
            Expression::Subtract(a, b) => {
                let (Some(x), Some(y)) = (
                    Number::from_value("$subtract", &a.evaluate(doc)?)?,
                    Number::from_value("$subtract", &b.evaluate(doc)?)?,
                ) else {
                    return Ok(Value::Null);
                };
                Ok(x.combine(y, i64::checked_sub, |x, y| x - y).into_value())
            }
            Expression::Divide(a, b) => {
                let (Some(x), Some(y)) = (
                    Number::from_value("$divide", &a.evaluate(doc)?)?,
                    Number::from_value("$divide", &b.evaluate(doc)?)?,
                ) else {
                    return Ok(Value::Null);
                };
                if y.as_f64() == 0.0 {
                    return Err(agg_error("can't $divide by zero"));
                }
                Ok(Value::from(x.as_f64() / y.as_f64()))
            }
            Expression::Floor(a) => match Number::from_value("$floor", &a.evaluate(doc)?)? {
                None => Ok(Value::Null),
                Some(Number::Int(i)) => Ok(Value::from(i)),
                Some(Number::Float(f)) => Ok(Value::from(f.floor())),
            },
        }
    }
}

fn fold_numeric<F>(op: &str, args: &[Expression], doc: &Value, init: Number, step: F) -> Result<Value>
where
    F: Fn(Number, Number) -> Number,
{
    let mut acc = init;
    let mut saw_null = false;
    for arg in args {
        match Number::from_value(op, &arg.evaluate(doc)?)? {
            Some(n) => acc = step(acc, n),
            None => saw_null = true,
        }
    }
    Ok(if saw_null { Value::Null } else { acc.into_value() })
}

// ============================================================================
// $group
// ============================================================================

impl GroupStage {
    fn from_json(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| agg_error("a group's fields must be specified in an object"))?;
        let id = obj
            .get("_id")
            .ok_or_else(|| agg_error("a group specification must include an _id"))
            .and_then(Expression::parse)?;

        let mut accumulators = Vec::new();
        for (field, acc) in obj {
            if field == "_id" {
                continue;
            }
            accumulators.push((field.clone(), Accumulator::from_json(field, acc)?));
        }
        Ok(GroupStage { id, accumulators })
    }

    fn execute(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        // First-seen order of keys, members per key
        let mut order: Vec<(Value, Vec<Value>)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for doc in docs {
            let key = self.id.evaluate(&doc)?;
            let canonical = canonical_json_string(&key);
            match positions.get(&canonical) {
                Some(&pos) => order[pos].1.push(doc),
                None => {
                    positions.insert(canonical, order.len());
                    order.push((key, vec![doc]));
                }
            }
        }

        order
            .into_iter()
            .map(|(key, members)| -> Result<Value> {
                let mut out = Map::new();
                out.insert("_id".to_string(), key);
                for (field, acc) in &self.accumulators {
                    out.insert(field.clone(), acc.compute(&members)?);
                }
                Ok(Value::Object(out))
            })
            .collect()
    }
}

impl Accumulator {
    fn from_json(field: &str, spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .filter(|o| o.len() == 1)
            .ok_or_else(|| {
                agg_error(format!(
                    "The field '{}' must be an accumulator object",
                    field
                ))
            })?;
        let Some((op, arg)) = obj.iter().next() else {
            return Err(agg_error("empty accumulator"));
        };
        let expr = Expression::parse(arg)?;
        match op.as_str() {
            "$sum" => Ok(Accumulator::Sum(expr)),
            "$avg" => Ok(Accumulator::Avg(expr)),
            "$min" => Ok(Accumulator::Min(expr)),
            "$max" => Ok(Accumulator::Max(expr)),
            other => Err(agg_error(format!("unknown group operator '{}'", other))),
        }
    }

    fn numbers(expr: &Expression, docs: &[Value]) -> Result<Vec<Number>> {
        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            // Non-numeric values are ignored by $sum and $avg
            if let Ok(Some(n)) = Number::from_value("", &expr.evaluate(doc)?) {
                out.push(n);
            }
        }
        Ok(out)
    }

    fn compute(&self, docs: &[Value]) -> Result<Value> {
        match self {
            Accumulator::Sum(expr) => Ok(Self::numbers(expr, docs)?
                .into_iter()
                .fold(Number::Int(0), |a, b| a.combine(b, i64::checked_add, |x, y| x + y))
                .into_value()),
            Accumulator::Avg(expr) => {
                let nums = Self::numbers(expr, docs)?;
                if nums.is_empty() {
                    return Ok(Value::Null);
                }
                let total: f64 = nums.iter().map(|n| n.as_f64()).sum();
                Ok(Value::from(total / nums.len() as f64))
            }
            Accumulator::Min(expr) => Self::extremum(expr, docs, Ordering::Less),
            Accumulator::Max(expr) => Self::extremum(expr, docs, Ordering::Greater),
        }
    }

    fn extremum(expr: &Expression, docs: &[Value], wanted: Ordering) -> Result<Value> {
        let mut best: Option<Value> = None;
        for doc in docs {
            let value = expr.evaluate(doc)?;
            if value.is_null() {
                continue;
            }
            let replace = match &best {
                None => true,
                Some(current) => sort_order(Some(&value), Some(current)) == wanted,
            };
            if replace {
                best = Some(value);
            }
        }
        Ok(best.unwrap_or(Value::Null))
    }
}

// ============================================================================
// $project
// ============================================================================

impl ProjectStage {
    fn from_json(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .filter(|o| !o.is_empty())
            .ok_or_else(|| agg_error("$project specification must be a nonempty object"))?;

        let mut fields = Vec::with_capacity(obj.len());
        for (field, value) in obj {
            let action = match value {
                Value::Bool(true) => ProjectField::Include,
                Value::Bool(false) => ProjectField::Exclude,
                Value::Number(n) if n.as_f64() == Some(0.0) => ProjectField::Exclude,
                Value::Number(_) => ProjectField::Include,
                other => ProjectField::Computed(Expression::parse(other)?),
            };
            fields.push((field.clone(), action));
        }

        let excludes_other_than_id = fields
            .iter()
            .any(|(f, a)| matches!(a, ProjectField::Exclude) && f != "_id");
        let includes = fields
            .iter()
            .any(|(_, a)| !matches!(a, ProjectField::Exclude));
        if excludes_other_than_id && includes {
            return Err(agg_error(
                "Invalid $project :: cannot mix inclusion and exclusion",
            ));
        }
        Ok(ProjectStage { fields })
    }

    fn apply(&self, doc: &Value) -> Result<Value> {
        let include_mode = self
            .fields
            .iter()
            .any(|(_, a)| !matches!(a, ProjectField::Exclude));

        if !include_mode {
            let mut out = doc.clone();
            if let Value::Object(map) = &mut out {
                for (field, _) in &self.fields {
                    map.remove(field);
                }
            }
            return Ok(out);
        }

        let mut out = Value::Object(Map::new());
        let id_excluded = self
            .fields
            .iter()
            .any(|(f, a)| f == "_id" && matches!(a, ProjectField::Exclude));
        if !id_excluded {
            if let Some(id) = doc.get("_id") {
                set_nested_value(&mut out, "_id", id.clone());
            }
        }
        for (field, action) in &self.fields {
            match action {
                ProjectField::Include => {
                    if let Some(v) = get_nested_value(doc, field) {
                        set_nested_value(&mut out, field, v.clone());
                    }
                }
                ProjectField::Computed(expr) => {
                    set_nested_value(&mut out, field, expr.evaluate(doc)?);
                }
                ProjectField::Exclude => {}
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(pipeline: Value, docs: Vec<Value>) -> Vec<Value> {
        Pipeline::from_json(&pipeline).unwrap().execute(docs).unwrap()
    }

    #[test]
    fn test_average_price_by_genre() {
        let docs = vec![
            json!({"title": "A", "genre": "F", "price": 10}),
            json!({"title": "B", "genre": "F", "price": 20}),
            json!({"title": "C", "genre": "G", "price": 30}),
        ];
        let result = run(
            json!([
                {"$group": {"_id": "$genre", "averagePrice": {"$avg": "$price"}}},
                {"$project": {"_id": 0, "genre": "$_id", "averagePrice": 1}},
                {"$sort": {"averagePrice": -1}}
            ]),
            docs,
        );
        assert_eq!(
            result,
            vec![
                json!({"genre": "G", "averagePrice": 30.0}),
                json!({"genre": "F", "averagePrice": 15.0})
            ]
        );
    }

    #[test]
    fn test_counts_by_decade() {
        let docs = vec![
            json!({"published_year": 1990}),
            json!({"published_year": 1981}),
            json!({"published_year": 1985}),
        ];
        let result = run(
            json!([
                {"$addFields": {"decade": {"$multiply": [{"$floor": {"$divide": ["$published_year", 10]}}, 10]}}},
                {"$group": {"_id": "$decade", "count": {"$sum": 1}}},
                {"$sort": {"_id": 1}},
                {"$project": {"_id": 0, "decade": "$_id", "count": 1}}
            ]),
            docs,
        );
        assert_eq!(result.len(), 2);
        assert_eq!(result[0]["decade"].as_f64(), Some(1980.0));
        assert_eq!(result[0]["count"], json!(2));
        assert_eq!(result[1]["decade"].as_f64(), Some(1990.0));
        assert_eq!(result[1]["count"], json!(1));
    }

    #[test]
    fn test_group_count_sort_limit() {
        let docs = vec![
            json!({"author": "Orwell"}),
            json!({"author": "Austen"}),
            json!({"author": "Orwell"}),
        ];
        let result = run(
            json!([
                {"$group": {"_id": "$author", "books": {"$sum": 1}}},
                {"$project": {"_id": 0, "author": "$_id", "books": 1}},
                {"$sort": {"books": -1, "author": 1}},
                {"$limit": 1}
            ]),
            docs,
        );
        assert_eq!(result, vec![json!({"author": "Orwell", "books": 2})]);
    }

    #[test]
    fn test_missing_group_key_forms_null_group() {
        let docs = vec![json!({"price": 5}), json!({"genre": "F", "price": 7})];
        let result = run(
            json!([{"$group": {"_id": "$genre", "total": {"$sum": "$price"}}}]),
            docs,
        );
        assert_eq!(result[0], json!({"_id": null, "total": 5}));
        assert_eq!(result[1], json!({"_id": "F", "total": 7}));
    }

    #[test]
    fn test_min_max_and_match_skip() {
        let docs: Vec<Value> = (1..=5).map(|i| json!({"n": i, "odd": i % 2 == 1})).collect();
        let result = run(
            json!([
                {"$match": {"odd": true}},
                {"$skip": 1},
                {"$group": {"_id": null, "lo": {"$min": "$n"}, "hi": {"$max": "$n"}}}
            ]),
            docs,
        );
        assert_eq!(result, vec![json!({"_id": null, "lo": 3, "hi": 5})]);
    }

    #[test]
    fn test_arithmetic_null_propagation_and_errors() {
        let doc = json!({"a": 7});
        let sum = Expression::parse(&json!({"$add": ["$a", "$missing"]})).unwrap();
        assert_eq!(sum.evaluate(&doc).unwrap(), Value::Null);

        let div = Expression::parse(&json!({"$divide": ["$a", 0]})).unwrap();
        assert!(div.evaluate(&doc).is_err());

        let bad = Expression::parse(&json!({"$multiply": ["$a", "x"]})).unwrap();
        assert!(bad.evaluate(&doc).is_err());

        assert!(Expression::parse(&json!({"$divide": [1]})).is_err());
        assert!(Expression::parse(&json!({"$pow": [2, 3]})).is_err());
    }

    #[test]
    fn test_invalid_pipelines() {
        assert!(Pipeline::from_json(&json!({"$match": {}})).is_err());
        assert!(Pipeline::from_json(&json!([{"$unknown": {}}])).is_err());
        assert!(Pipeline::from_json(&json!([{"$limit": 0}])).is_err());
        assert!(Pipeline::from_json(&json!([{"$sort": {"a": 2}}])).is_err());
        assert!(Pipeline::from_json(&json!([{"$group": {"n": {"$sum": 1}}}])).is_err());
        assert!(Pipeline::from_json(&json!([{"$project": {"a": 1, "b": 0}}])).is_err());
    }
}
