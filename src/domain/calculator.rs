use std::sync::Arc;

use async_trait::async_trait;
use rust_mcp_sdk::schema::CallToolResult;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    domain::utils::{number_value, parse_args},
    errors::{HandlerError, RegistryError},
    mcp::{
        registry::{tool_result, Registry, ToolHandler},
        schema::{Field, SchemaMap, ValidatedArgs},
    },
};

#[derive(Debug, Deserialize)]
struct AddArgs {
    a: f64,
    b: f64,
}

pub struct CalculatorAdd;

#[async_trait]
impl ToolHandler for CalculatorAdd {
    async fn call(&self, args: ValidatedArgs) -> Result<CallToolResult, HandlerError> {
        let AddArgs { a, b } = parse_args(args)?;
        let result = number_value(a + b)
            .ok_or_else(|| HandlerError::new("sum is not a finite number"))?;

        let output = Map::from_iter([("result".to_string(), result)]);
        let text = Value::Object(output.clone()).to_string();
        Ok(tool_result(text, output))
    }
}

pub fn register_calculator(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register_tool(
        "calculator-add",
        SchemaMap::new()
            .field("a", Field::number().describe("The first number."))
            .field("b", Field::number().describe("The second number.")),
        Some(SchemaMap::new().field("result", Field::number())),
        "A simple calculator tool that can add two numbers.",
        Arc::new(CalculatorAdd),
    )
}
