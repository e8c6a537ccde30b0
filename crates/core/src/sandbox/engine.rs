//! rquickjs-backed evaluation of the per-call procedure (§4.C steps 1-5).
//!
//! Vanilla QuickJS has no `fetch`, `process`, `require`, or timer globals, so
//! the "no ambient authority" guarantee holds for free: the only reachable
//! name is the `tools` object we materialize below. Each leaf is a native
//! function wrapped as an `async` arrow so it satisfies the spec's
//! `(input) => Promise<output>` shape, even though the native side is
//! synchronous underneath (it blocks the worker thread on the real async
//! work via a captured [`tokio::runtime::Handle`]).

use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use rquickjs::{Context, Ctx, Exception, Function, Promise, PromiseState, Runtime, Value as JsValue};
use serde_json::{Map, Value};
use tokio::runtime::Handle;

use crate::approval::Decision;
use crate::tool_tree::{Approval, ToolNode, ToolTree};

use super::receipt::{bounded_preview, CallStatus, ReceiptDecision, ToolCallReceipt};
use super::{ApprovalRequest, ReceiptSink, RunContext};

struct HostState {
    run_ctx: RunContext,
    sink: ReceiptSink,
    handle: Handle,
}

enum CallOutcome {
    Value(Value),
    Undefined,
    Throw(String),
}

pub(crate) async fn evaluate(code: String, run_ctx: RunContext, sink: ReceiptSink) -> Result<Value, String> {
    let handle = Handle::current();
    match tokio::task::spawn_blocking(move || run_blocking(code, run_ctx, sink, handle)).await {
        Ok(result) => result,
        Err(join_err) => Err(format!("sandbox engine panicked: {join_err}")),
    }
}

fn run_blocking(code: String, run_ctx: RunContext, sink: ReceiptSink, handle: Handle) -> Result<Value, String> {
    let runtime = Runtime::new().map_err(|e| format!("failed to start sandbox runtime: {e}"))?;
    let context = Context::full(&runtime).map_err(|e| format!("failed to start sandbox context: {e}"))?;

    let host = Rc::new(HostState { run_ctx, sink, handle });

    context.with(|js_ctx| {
        if let Err(e) = install_tools(&js_ctx, &host) {
            return Err(describe_exception(&js_ctx, e));
        }

        let wrapped = format!("(async () => {{\n{code}\n}})();");
        let promise: Promise = match js_ctx.eval(wrapped.into_bytes()) {
            Ok(p) => p,
            Err(e) => return Err(describe_exception(&js_ctx, e)),
        };

        drain_jobs(&runtime);

        match promise.state() {
            PromiseState::Fulfilled => {
                let value: JsValue = promise
                    .result()
                    .expect("fulfilled promise carries a result")
                    .map_err(|e| describe_exception(&js_ctx, e))?;
                js_to_json(&value).map_err(|e| describe_exception(&js_ctx, e))
            }
            PromiseState::Rejected => {
                let err: rquickjs::Error = promise
                    .result::<JsValue>()
                    .expect("rejected promise carries a result")
                    .unwrap_err();
                Err(describe_exception(&js_ctx, err))
            }
            PromiseState::Pending => Err("sandbox code did not settle".to_string()),
        }
    })
}

fn install_tools<'js>(js_ctx: &Ctx<'js>, host: &Rc<HostState>) -> rquickjs::Result<()> {
    let host_for_fn = host.clone();
    let native_call = Function::new(
        js_ctx.clone(),
        move |ctx: Ctx<'js>, path: String, input: JsValue<'js>| -> rquickjs::Result<JsValue<'js>> {
            let input_json = js_to_json(&input)?;
            match call_tool(&host_for_fn, &path, input_json) {
                CallOutcome::Value(value) => json_to_js(&ctx, &value),
                CallOutcome::Undefined => Ok(JsValue::new_undefined(ctx.clone())),
                CallOutcome::Throw(message) => Err(Exception::throw_message(&ctx, &message)),
            }
        },
    )?;
    js_ctx.globals().set("__nativeCall", native_call)?;

    let script = build_tools_script(&host.run_ctx.tools);
    js_ctx.eval::<(), _>(script.into_bytes())?;
    Ok(())
}

/// §4.C per-call procedure, steps 1-4. Step 5 (exception propagation, the
/// `ok` computation) is handled by the caller once this returns.
fn call_tool(host: &HostState, path: &str, input: Value) -> CallOutcome {
    let call_id = (host.run_ctx.new_call_id)();
    let timestamp = (host.run_ctx.now)();
    let input_preview = bounded_preview(&input);

    let Some(tool) = host.run_ctx.tools.get(path) else {
        return CallOutcome::Throw(format!("unknown tool: {path}"));
    };
    let approval_mode = tool.approval.into();

    if let Err(message) = validate_input(&tool.args_schema, &input) {
        host.sink.push(ToolCallReceipt {
            call_id,
            tool_path: path.to_string(),
            approval: approval_mode,
            decision: ReceiptDecision::Auto,
            status: CallStatus::Failed,
            timestamp,
            input_preview,
            output_preview: None,
            error: Some(message.clone()),
        });
        return CallOutcome::Throw(message);
    }

    let decision = if tool.approval == Approval::Required {
        let preview = tool.approval_preview(path, &input);
        let request = ApprovalRequest {
            call_id: call_id.clone(),
            task_id: host.run_ctx.task_id.clone(),
            tool_path: path.to_string(),
            input: input.clone(),
            preview,
        };
        let requester = host.run_ctx.requester.clone();
        Some(host.handle.block_on(requester.request_approval(request)))
    } else {
        None
    };

    if matches!(decision, Some(Decision::Denied)) {
        host.sink.push(ToolCallReceipt {
            call_id,
            tool_path: path.to_string(),
            approval: approval_mode,
            decision: ReceiptDecision::Denied,
            status: CallStatus::Denied,
            timestamp,
            input_preview,
            output_preview: None,
            error: None,
        });
        return CallOutcome::Undefined;
    }

    let receipt_decision = match decision {
        Some(Decision::Approved) => ReceiptDecision::Approved,
        Some(Decision::Denied) => unreachable!("handled above"),
        None => ReceiptDecision::Auto,
    };

    match host.handle.block_on(tool.executor.run(input)) {
        Ok(output) => {
            let output_preview = bounded_preview(&output);
            host.sink.push(ToolCallReceipt {
                call_id,
                tool_path: path.to_string(),
                approval: approval_mode,
                decision: receipt_decision,
                status: CallStatus::Succeeded,
                timestamp,
                input_preview,
                output_preview: Some(output_preview),
                error: None,
            });
            CallOutcome::Value(output)
        }
        Err(tool_error) => {
            let message = tool_error.display_chain();
            host.sink.push(ToolCallReceipt {
                call_id,
                tool_path: path.to_string(),
                approval: approval_mode,
                decision: receipt_decision,
                status: CallStatus::Failed,
                timestamp,
                input_preview,
                output_preview: None,
                error: Some(message.clone()),
            });
            CallOutcome::Throw(message)
        }
    }
}

fn validate_input(schema: &Value, input: &Value) -> Result<(), String> {
    let validator = jsonschema::validator_for(schema).map_err(|e| format!("invalid schema: {e}"))?;
    validator.validate(input).map_err(|e| e.to_string())
}

/// Build the JS source that materializes `globalThis.tools` mirroring the
/// tree's nesting. Tool paths are developer-registered constants, not
/// user input, so direct interpolation (behind `JSON.stringify`-style
/// escaping for each segment) is safe.
fn build_tools_script(tree: &ToolTree) -> String {
    let mut script = String::from("globalThis.tools = {};\n");
    walk_tools(&mut script, "", tree.root_map());
    script
}

fn walk_tools(script: &mut String, prefix: &str, map: &IndexMap<String, ToolNode>) {
    for (name, node) in map {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        let accessor = js_accessor(&path);
        match node {
            ToolNode::Branch(sub) => {
                script.push_str(&format!("{accessor} = {accessor} || {{}};\n"));
                walk_tools(script, &path, sub);
            }
            ToolNode::Leaf(_) => {
                let literal = serde_json::to_string(&path).unwrap_or_else(|_| "\"\"".to_string());
                script.push_str(&format!("{accessor} = async (input) => __nativeCall({literal}, input);\n"));
            }
        }
    }
}

fn js_accessor(path: &str) -> String {
    let mut accessor = String::from("globalThis.tools");
    for segment in path.split('.') {
        let literal = serde_json::to_string(segment).unwrap_or_else(|_| "\"\"".to_string());
        accessor.push('[');
        accessor.push_str(&literal);
        accessor.push(']');
    }
    accessor
}

fn drain_jobs(runtime: &Runtime) {
    while runtime.is_job_pending() {
        if runtime.execute_pending_job().is_err() {
            break;
        }
    }
}

fn describe_exception(ctx: &Ctx<'_>, err: rquickjs::Error) -> String {
    if !err.is_exception() {
        return err.to_string();
    }
    let exc = ctx.catch();
    if let Some(obj) = exc.as_object() {
        if let Ok(message) = obj.get::<_, String>("message") {
            return message;
        }
    }
    if let Some(s) = exc.as_string() {
        if let Ok(s) = s.to_string() {
            return s;
        }
    }
    "unknown sandbox exception".to_string()
}

fn json_to_js<'js>(ctx: &Ctx<'js>, value: &Value) -> rquickjs::Result<JsValue<'js>> {
    Ok(match value {
        Value::Null => JsValue::new_undefined(ctx.clone()),
        Value::Bool(b) => JsValue::new_bool(ctx.clone(), *b),
        Value::Number(n) => JsValue::new_number(ctx.clone(), n.as_f64().unwrap_or(0.0)),
        Value::String(s) => rquickjs::String::from_str(ctx.clone(), s)?.into_value(),
        Value::Array(items) => {
            let arr = rquickjs::Array::new(ctx.clone())?;
            for (i, item) in items.iter().enumerate() {
                arr.set(i as u32, json_to_js(ctx, item)?)?;
            }
            arr.into_value()
        }
        Value::Object(map) => {
            let obj = rquickjs::Object::new(ctx.clone())?;
            for (k, v) in map {
                obj.set(k.as_str(), json_to_js(ctx, v)?)?;
            }
            obj.into_value()
        }
    })
}

fn js_to_json(value: &JsValue<'_>) -> rquickjs::Result<Value> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(Value::Bool(b));
    }
    if let Some(s) = value.as_string() {
        return Ok(Value::String(s.to_string()?));
    }
    if let Some(arr) = value.as_array() {
        let mut items = Vec::with_capacity(arr.len());
        for item in arr.iter::<JsValue>() {
            items.push(js_to_json(&item?)?);
        }
        return Ok(Value::Array(items));
    }
    if let Some(obj) = value.as_object() {
        if obj.as_array().is_none() {
            let mut map = Map::new();
            for key in obj.keys::<String>() {
                let key = key?;
                let v: JsValue = obj.get(&key)?;
                map.insert(key, js_to_json(&v)?);
            }
            return Ok(Value::Object(map));
        }
    }
    if let Some(n) = value.as_float() {
        return Ok(serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null));
    }
    if let Some(n) = value.as_int() {
        return Ok(Value::Number(n.into()));
    }
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_script_mirrors_nested_paths() {
        let tree = ToolTree::build(|b| {
            b.define(
                "github.issues.close",
                crate::tool_tree::Tool {
                    description: "x".into(),
                    approval: Approval::Required,
                    args_schema: Value::Null,
                    returns_schema: Value::Null,
                    executor: Arc::new(|v: Value| async move { Ok(v) }),
                    format_approval: None,
                },
            );
        });
        let script = build_tools_script(&tree);
        assert!(script.contains("__nativeCall(\"github.issues.close\""));
        assert!(script.contains("globalThis.tools[\"github\"] = globalThis.tools[\"github\"] || {};"));
    }
}
