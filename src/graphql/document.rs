use graphql_parser::{
    Pos,
    query::{Definition, Directive, FragmentDefinition, OperationDefinition, Selection, SelectionSet, Value as ValueNode, VariableDefinition},
};
use serde_json::{Map, Number, Value};

use crate::{
    graphql::parser::MAX_DEPTH,
    model::apperror::{ApplicationError, ErrorType},
};

/**
 * Most fields an operation may select once fragments are expanded.
 */
pub const MAX_FIELDS: usize = 10_000;

/**
 * Kind of operation found in a query document.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

/**
 * Parsed query document: the operations and fragment definitions it declares.
 */
#[derive(Debug)]
pub struct Document<'a> {
    operations: Vec<OperationSource<'a>>,
    fragments: Vec<FragmentDefinition<'a, String>>,
}

#[derive(Debug)]
struct OperationSource<'a> {
    kind: OperationKind,
    name: Option<String>,
    variable_definitions: Vec<VariableDefinition<'a, String>>,
    selection_set: SelectionSet<'a, String>,
}

/**
 * Executable operation: one operation of the document with variables applied, `@skip`/`@include`
 * evaluated and fragments inlined.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub selection: Vec<Field>,
}

/**
 * A requested field with its arguments resolved to JSON values.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Arguments,
    pub selection: Vec<Field>,
}

impl Field {
    /**
     * Key used for this field in the response: the alias when given, else the name as written.
     */
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /**
     * Field name in lower case. Field names are matched case-insensitively.
     */
    pub fn lookup_name(&self) -> String {
        self.name.to_ascii_lowercase()
    }
}

/**
 * Resolved field arguments. Lookup is case-insensitive and an explicit `null` counts as absent.
 */
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Vec<(String, Value)>,
}

impl Arguments {
    pub fn new(values: Vec<(String, Value)>) -> Self {
        Arguments { values }
    }

    /**
     * Returns the first non-null value whose name matches one of `names`.
     *
     * # Arguments
     * `names`: Accepted argument names, the first one being the canonical name.
     */
    pub fn get(&self, names: &[&str]) -> Option<&Value> {
        names.iter().find_map(|name| self.values.iter().find(|(key, value)| key.eq_ignore_ascii_case(name) && !value.is_null()).map(|(_, value)| value))
    }

    pub fn required_string(&self, names: &[&str]) -> Result<String, ApplicationError> {
        self.optional_string(names)?.ok_or_else(|| missing(names))
    }

    /**
     * Reads a string argument. Blank strings are rejected.
     */
    pub fn optional_string(&self, names: &[&str]) -> Result<Option<String>, ApplicationError> {
        match self.get(names) {
            None => Ok(None),
            Some(Value::String(value)) if value.trim().is_empty() => Err(ApplicationError::validation(format!("Argument '{}' must not be blank", canonical(names)))),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(ApplicationError::validation(format!("Argument '{}' must be a string", canonical(names)))),
        }
    }

    pub fn required_id(&self, names: &[&str]) -> Result<String, ApplicationError> {
        self.optional_id(names)?.ok_or_else(|| missing(names))
    }

    /**
     * Reads an identifier. Identifiers may be given as strings or integers and are carried as strings.
     */
    pub fn optional_id(&self, names: &[&str]) -> Result<Option<String>, ApplicationError> {
        match self.get(names) {
            None => Ok(None),
            Some(Value::String(value)) if value.trim().is_empty() => Err(ApplicationError::validation(format!("Argument '{}' must not be blank", canonical(names)))),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(Value::Number(number)) if number.is_i64() || number.is_u64() => Ok(Some(number.to_string())),
            Some(_) => Err(ApplicationError::validation(format!("Argument '{}' must be an identifier", canonical(names)))),
        }
    }

    /**
     * Reads an integer. Integer strings are accepted.
     */
    pub fn required_integer(&self, names: &[&str]) -> Result<i64, ApplicationError> {
        match self.get(names) {
            None => Err(missing(names)),
            Some(Value::Number(number)) => number.as_i64().ok_or_else(|| ApplicationError::validation(format!("Argument '{}' must be an integer", canonical(names)))),
            Some(Value::String(value)) => value.trim().parse::<i64>().map_err(|_err| ApplicationError::validation(format!("Argument '{}' must be an integer", canonical(names)))),
            Some(_) => Err(ApplicationError::validation(format!("Argument '{}' must be an integer", canonical(names)))),
        }
    }

    /**
     * Reads a finite number. Numeric strings are accepted.
     */
    pub fn required_number(&self, names: &[&str]) -> Result<f64, ApplicationError> {
        let number = match self.get(names) {
            None => return Err(missing(names)),
            Some(Value::Number(number)) => number.as_f64(),
            Some(Value::String(value)) => value.trim().parse::<f64>().ok(),
            Some(_) => None,
        };
        number.filter(|value| value.is_finite()).ok_or_else(|| ApplicationError::validation(format!("Argument '{}' must be a number", canonical(names))))
    }
}

fn canonical<'a>(names: &[&'a str]) -> &'a str {
    names.first().copied().unwrap_or("argument")
}

fn missing(names: &[&str]) -> ApplicationError {
    ApplicationError::validation(format!("Argument '{}' is required", canonical(names)))
}

impl<'a> Document<'a> {
    /**
     * Sorts the definitions of a parsed document into operations and fragments.
     * Subscriptions are rejected.
     */
    pub fn new(document: graphql_parser::query::Document<'a, String>) -> Result<Self, ApplicationError> {
        let mut operations = Vec::new();
        let mut fragments = Vec::new();
        for definition in document.definitions {
            let operation = match definition {
                Definition::Fragment(fragment) => {
                    fragments.push(fragment);
                    continue;
                }
                Definition::Operation(OperationDefinition::SelectionSet(selection_set)) => OperationSource { kind: OperationKind::Query, name: None, variable_definitions: Vec::new(), selection_set },
                Definition::Operation(OperationDefinition::Query(query)) => OperationSource { kind: OperationKind::Query, name: query.name, variable_definitions: query.variable_definitions, selection_set: query.selection_set },
                Definition::Operation(OperationDefinition::Mutation(mutation)) => {
                    OperationSource { kind: OperationKind::Mutation, name: mutation.name, variable_definitions: mutation.variable_definitions, selection_set: mutation.selection_set }
                }
                Definition::Operation(OperationDefinition::Subscription(subscription)) => return Err(syntax_error(subscription.position, "subscriptions are not supported")),
            };
            operations.push(operation);
        }
        if operations.is_empty() {
            return Err(ApplicationError::new(ErrorType::QuerySyntax, "Document does not contain an operation".to_string()));
        }
        Ok(Document { operations, fragments })
    }

    /**
     * Selects the operation to execute and applies the request variables.
     *
     * # Arguments
     * `operation_name`: Name of the operation to run. Required when the document holds more than one.
     * `variables`: Variable values sent with the request.
     *
     * # Returns
     * The executable operation or a `QuerySyntax` error.
     */
    pub fn operation(&self, operation_name: Option<&str>, variables: &Map<String, Value>) -> Result<Operation, ApplicationError> {
        let definition = match operation_name {
            Some(name) => self
                .operations
                .iter()
                .find(|operation| operation.name.as_deref() == Some(name))
                .ok_or_else(|| ApplicationError::new(ErrorType::QuerySyntax, format!("Unknown operation named '{name}'")))?,
            None => match self.operations.as_slice() {
                [single] => single,
                _ => return Err(ApplicationError::new(ErrorType::QuerySyntax, "Must provide operation name if query contains multiple operations".to_string())),
            },
        };
        let mut scope = Map::new();
        for definition in &definition.variable_definitions {
            let value = match (variables.get(&definition.name), &definition.default_value) {
                (Some(value), _) => value.clone(),
                (None, Some(default_value)) => resolve_value(default_value, &Map::new())?,
                (None, None) => Value::Null,
            };
            scope.insert(definition.name.clone(), value);
        }
        let mut resolver = SelectionResolver { fragments: &self.fragments, scope: &scope, spreads: Vec::new(), selected: 0 };
        Ok(Operation { kind: definition.kind, name: definition.name.clone(), selection: resolver.selection_set(&definition.selection_set, 1)? })
    }
}

/**
 * Turns selection sets into fields: applies variables, evaluates `@skip`/`@include` and inlines fragments.
 */
struct SelectionResolver<'d, 'a> {
    fragments: &'d [FragmentDefinition<'a, String>],
    scope: &'d Map<String, Value>,
    spreads: Vec<String>,
    selected: usize,
}

impl<'a> SelectionResolver<'_, 'a> {
    fn selection_set(&mut self, selection_set: &SelectionSet<'a, String>, depth: usize) -> Result<Vec<Field>, ApplicationError> {
        if depth > MAX_DEPTH {
            return Err(syntax_error(selection_set.span.0, format!("document nests deeper than {MAX_DEPTH} levels")));
        }
        let mut fields = Vec::with_capacity(selection_set.items.len());
        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => {
                    if !is_included(&field.directives, self.scope)? {
                        continue;
                    }
                    self.selected += 1;
                    if self.selected > MAX_FIELDS {
                        return Err(syntax_error(field.position, format!("operation selects more than {MAX_FIELDS} fields")));
                    }
                    let arguments = field.arguments.iter().map(|(name, value)| Ok((name.clone(), resolve_value(value, self.scope)?))).collect::<Result<Vec<_>, ApplicationError>>()?;
                    fields.push(Field { alias: field.alias.clone(), name: field.name.clone(), arguments: Arguments::new(arguments), selection: self.selection_set(&field.selection_set, depth + 1)? });
                }
                Selection::InlineFragment(fragment) => {
                    if is_included(&fragment.directives, self.scope)? {
                        fields.extend(self.selection_set(&fragment.selection_set, depth + 1)?);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if !is_included(&spread.directives, self.scope)? {
                        continue;
                    }
                    let name = &spread.fragment_name;
                    if self.spreads.contains(name) {
                        return Err(syntax_error(spread.position, format!("fragment '{name}' spreads itself")));
                    }
                    let fragment = self.fragments.iter().find(|fragment| &fragment.name == name).ok_or_else(|| syntax_error(spread.position, format!("unknown fragment '{name}'")))?;
                    self.spreads.push(name.clone());
                    let expanded = self.selection_set(&fragment.selection_set, depth + 1);
                    self.spreads.pop();
                    fields.extend(expanded?);
                }
            }
        }
        Ok(fields)
    }
}

fn syntax_error(position: Pos, message: impl std::fmt::Display) -> ApplicationError {
    ApplicationError::new(ErrorType::QuerySyntax, format!("Syntax error at {}:{}: {message}", position.line, position.column))
}

fn is_included(directives: &[Directive<'_, String>], scope: &Map<String, Value>) -> Result<bool, ApplicationError> {
    for directive in directives {
        let expected = match directive.name.as_str() {
            "skip" => false,
            "include" => true,
            _ => continue,
        };
        let condition = directive.arguments.iter().find(|(name, _)| name == "if").map(|(_, value)| resolve_value(value, scope)).transpose()?;
        match condition {
            Some(Value::Bool(condition)) if condition != expected => return Ok(false),
            Some(Value::Bool(_)) => {}
            _ => return Err(ApplicationError::new(ErrorType::QuerySyntax, format!("Directive '@{}' requires a boolean 'if' argument", directive.name))),
        }
    }
    Ok(true)
}

fn resolve_value(value: &ValueNode<'_, String>, scope: &Map<String, Value>) -> Result<Value, ApplicationError> {
    Ok(match value {
        ValueNode::Variable(name) => scope.get(name).cloned().ok_or_else(|| ApplicationError::new(ErrorType::QuerySyntax, format!("Variable '${name}' is not defined")))?,
        ValueNode::Int(number) => number.as_i64().map(Value::from).unwrap_or(Value::Null),
        ValueNode::Float(value) => Number::from_f64(*value).map(Value::Number).unwrap_or(Value::Null),
        ValueNode::String(value) | ValueNode::Enum(value) => Value::String(value.clone()),
        ValueNode::Boolean(value) => Value::Bool(*value),
        ValueNode::Null => Value::Null,
        ValueNode::List(values) => Value::Array(values.iter().map(|value| resolve_value(value, scope)).collect::<Result<Vec<_>, _>>()?),
        ValueNode::Object(fields) => Value::Object(fields.iter().map(|(name, value)| Ok((name.clone(), resolve_value(value, scope)?))).collect::<Result<Map<_, _>, ApplicationError>>()?),
    })
}
