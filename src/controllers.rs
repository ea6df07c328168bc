use crate::directory::{AdminUpdate, NewAdmin, RegisterRequest};
use crate::error::{DeskError, Result};
use crate::models::{Identity, Role};
use crate::state::Desk;
use crate::views::{self, AdminView, FileCase, StudentView, SuperAdminView};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

const MAX_SUBJECT_LEN: usize = 200;
const MAX_CATEGORY_LEN: usize = 100;
const MAX_TEXT_LEN: usize = 8_192;

const TOOLS: &[(&str, &str)] = &[
    ("auth/login", "Log in with email and password"),
    ("auth/register", "Register a student account and log in"),
    ("auth/logout", "End the current session"),
    ("auth/whoami", "Current identity and its landing page"),
    ("auth/change_password", "Change the current identity's password"),
    ("student/file_case", "File a new grievance"),
    ("student/dashboard", "Own case statistics and recent cases"),
    ("student/my_cases", "List own cases"),
    ("student/open_case", "Open one of your cases"),
    ("student/reply", "Reply on one of your cases"),
    ("admin/cases", "List cases for a department"),
    ("admin/open_case", "Open a case"),
    ("admin/reply", "Reply on a case"),
    ("admin/change_status", "Change status with a remark"),
    ("admin/set_priority", "Change case priority"),
    ("admin/escalate", "Escalate a case (status Escalated, priority Critical)"),
    ("admin/request_resolve", "Ask to resolve a case; returns a confirmation token"),
    ("superadmin/escalated", "List critical or escalated cases"),
    ("superadmin/all_cases", "List every case (read-only)"),
    ("superadmin/open_case", "Open a case"),
    ("superadmin/reply", "Reply on a case"),
    ("superadmin/request_resolve", "Ask to resolve a case; returns a confirmation token"),
    ("superadmin/admins", "List admin accounts"),
    ("superadmin/create_admin", "Create an admin account"),
    ("superadmin/update_admin", "Edit an admin account"),
    ("superadmin/request_delete_admin", "Ask to delete an admin; returns a confirmation token"),
    ("confirm", "Confirm or cancel a pending resolve/delete"),
];

pub async fn handle_rpc_request(desk: Desk, req: Value) -> Value {
    let method = req.get("method").and_then(|v| v.as_str()).unwrap_or("");
    let id = req.get("id");
    let params = req.get("params").cloned().unwrap_or(json!({}));

    match method {
        "tools/call" => {
            let tool_name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let args = params.get("arguments").cloned().unwrap_or(json!({}));

            match call_tool(&desk, tool_name, args).await {
                Ok(content) => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": { "content": [{ "type": "text", "text": content.to_string() }] }
                }),
                Err(e) => {
                    tracing::debug!("Tool {} failed: {}", tool_name, e);
                    json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {
                            "code": e.rpc_code(),
                            "message": e.to_string(),
                            "data": { "kind": e.kind() }
                        }
                    })
                }
            }
        }
        "tools/list" => {
            let tools: Vec<Value> = TOOLS
                .iter()
                .map(|(name, description)| json!({ "name": name, "description": description }))
                .collect();
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "tools": tools }
            })
        }
        _ => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": "Method not found" }
        }),
    }
}

// ── Argument helpers ─────────────────────────────────────────────────────────

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| DeskError::Validation(format!("Missing {}", key)))
}

fn opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn expected_version(args: &Value) -> Option<u64> {
    args.get("expectedVersion").and_then(|v| v.as_u64())
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    Ok(serde_json::from_value(args)?)
}

fn bounded_text<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    let text = str_arg(args, key)?;
    if text.len() > MAX_TEXT_LEN {
        return Err(DeskError::Validation(format!(
            "{} exceeds {} byte limit",
            key, MAX_TEXT_LEN
        )));
    }
    Ok(text)
}

/// Short form fields are capped in characters, not bytes.
fn check_chars(value: &str, field: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(DeskError::Validation(format!(
            "{} exceeds {} character limit",
            field, max
        )));
    }
    Ok(())
}

fn guard(desk: &Desk, args: &Value, role: Role) -> Result<Identity> {
    desk.directory.require(opt_str(args, "session"), role)
}

/// Confirm is shared by admin and superadmin sessions.
fn staff_guard(desk: &Desk, args: &Value) -> Result<Identity> {
    desk.directory
        .require_any(opt_str(args, "session"), &[Role::Admin, Role::Superadmin])
}

fn to_value<T: serde::Serialize>(v: T) -> Result<Value> {
    serde_json::to_value(v).map_err(|e| DeskError::Internal(format!("serialization failed: {}", e)))
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

async fn call_tool(desk: &Desk, tool: &str, args: Value) -> Result<Value> {
    match tool.split_once('/') {
        Some(("auth", op)) => auth_tool(desk, op, args).await,
        Some(("student", op)) => student_tool(desk, op, args),
        Some(("admin", op)) => admin_tool(desk, op, args),
        Some(("superadmin", op)) => superadmin_tool(desk, op, args),
        None if tool == "confirm" => {
            let user = staff_guard(desk, &args)?;
            let token = str_arg(&args, "token")?;
            let accept = args.get("accept").and_then(|v| v.as_bool()).unwrap_or(false);
            to_value(views::confirm(desk, &user, token, accept)?)
        }
        _ => Err(DeskError::NotFound(format!("Unknown tool: {}", tool))),
    }
}

async fn auth_tool(desk: &Desk, op: &str, args: Value) -> Result<Value> {
    let delay = desk.config.auth_delay;
    match op {
        "login" => {
            let email = str_arg(&args, "email")?;
            let password = str_arg(&args, "password")?;
            to_value(desk.directory.login(email, password, delay).await?)
        }
        "register" => {
            let req: RegisterRequest = parse_args(args)?;
            to_value(desk.directory.register(req, delay).await?)
        }
        "logout" => {
            let token = str_arg(&args, "session")?;
            Ok(json!({ "loggedOut": desk.directory.logout(token) }))
        }
        "whoami" => {
            let token = str_arg(&args, "session")?;
            match desk.directory.current_user(token) {
                Some(user) => {
                    let landing = user.role.landing_page();
                    Ok(json!({ "user": user, "landingPage": landing }))
                }
                None => Ok(json!({ "user": null, "landingPage": "auth" })),
            }
        }
        "change_password" => {
            let token = str_arg(&args, "session")?;
            let user = desk
                .directory
                .current_user(token)
                .ok_or_else(|| {
                    DeskError::Authentication("Unknown or expired session".to_string())
                })?;
            desk.directory.change_password(
                &user.id,
                opt_str(&args, "current").unwrap_or(""),
                opt_str(&args, "new").unwrap_or(""),
                opt_str(&args, "confirm").unwrap_or(""),
            )?;
            Ok(json!({ "changed": true }))
        }
        _ => Err(DeskError::NotFound(format!("Unknown tool: auth/{}", op))),
    }
}

fn student_tool(desk: &Desk, op: &str, args: Value) -> Result<Value> {
    let user = guard(desk, &args, Role::Student)?;
    let view = StudentView::new(desk, user);
    match op {
        "file_case" => {
            let form: FileCase = parse_args(args)?;
            check_chars(&form.subject, "subject", MAX_SUBJECT_LEN)?;
            check_chars(&form.category, "category", MAX_CATEGORY_LEN)?;
            if form.description.len() > MAX_TEXT_LEN {
                return Err(DeskError::Validation(format!(
                    "description exceeds {} byte limit",
                    MAX_TEXT_LEN
                )));
            }
            to_value(view.file_case(form)?)
        }
        "dashboard" => to_value(view.dashboard()),
        "my_cases" => to_value(view.my_cases()),
        "open_case" => to_value(view.open_case(str_arg(&args, "caseId")?)?),
        "reply" => to_value(view.reply(
            str_arg(&args, "caseId")?,
            bounded_text(&args, "text")?,
            expected_version(&args),
        )?),
        _ => Err(DeskError::NotFound(format!("Unknown tool: student/{}", op))),
    }
}

fn admin_tool(desk: &Desk, op: &str, args: Value) -> Result<Value> {
    let user = guard(desk, &args, Role::Admin)?;
    let view = AdminView::new(desk, user);
    match op {
        "cases" => to_value(view.department_cases(opt_str(&args, "department"))),
        "open_case" => to_value(view.open_case(str_arg(&args, "caseId")?)?),
        "reply" => to_value(view.reply(
            str_arg(&args, "caseId")?,
            bounded_text(&args, "text")?,
            expected_version(&args),
        )?),
        "change_status" => to_value(view.change_status(
            str_arg(&args, "caseId")?,
            str_arg(&args, "status")?,
            bounded_text(&args, "remark")?,
            expected_version(&args),
        )?),
        "set_priority" => to_value(view.set_priority(
            str_arg(&args, "caseId")?,
            str_arg(&args, "priority")?,
            expected_version(&args),
        )?),
        "escalate" => to_value(view.escalate(str_arg(&args, "caseId")?, expected_version(&args))?),
        "request_resolve" => to_value(view.request_resolve(str_arg(&args, "caseId")?)?),
        _ => Err(DeskError::NotFound(format!("Unknown tool: admin/{}", op))),
    }
}

fn superadmin_tool(desk: &Desk, op: &str, args: Value) -> Result<Value> {
    let user = guard(desk, &args, Role::Superadmin)?;
    let view = SuperAdminView::new(desk, user);
    match op {
        "escalated" => to_value(view.escalated()),
        "all_cases" => to_value(view.all_cases()),
        "open_case" => to_value(view.open_case(str_arg(&args, "caseId")?)?),
        "reply" => to_value(view.reply(
            str_arg(&args, "caseId")?,
            bounded_text(&args, "text")?,
            expected_version(&args),
        )?),
        "request_resolve" => to_value(view.request_resolve(str_arg(&args, "caseId")?)?),
        "admins" => to_value(view.admins()),
        "create_admin" => {
            let new: NewAdmin = parse_args(args)?;
            to_value(view.create_admin(new)?)
        }
        "update_admin" => {
            let admin_id = str_arg(&args, "adminId")?.to_string();
            let update: AdminUpdate = parse_args(args)?;
            to_value(view.update_admin(&admin_id, update)?)
        }
        "request_delete_admin" => to_value(view.request_delete_admin(str_arg(&args, "adminId")?)?),
        _ => Err(DeskError::NotFound(format!("Unknown tool: superadmin/{}", op))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeskConfig;
    use std::time::Duration;

    fn test_desk() -> Desk {
        Desk::new(DeskConfig {
            bcrypt_cost: 4,
            auth_delay: Duration::ZERO,
            ..Default::default()
        })
        .unwrap()
    }

    async fn call(desk: &Desk, name: &str, arguments: Value) -> Value {
        handle_rpc_request(
            desk.clone(),
            json!({
                "jsonrpc": "2.0", "id": 7, "method": "tools/call",
                "params": { "name": name, "arguments": arguments }
            }),
        )
        .await
    }

    /// Unwrap the text content of a successful tools/call response.
    fn content(resp: &Value) -> Value {
        let text = resp["result"]["content"][0]["text"]
            .as_str()
            .unwrap_or_else(|| panic!("expected a result, got {}", resp));
        serde_json::from_str(text).unwrap()
    }

    async fn login(desk: &Desk, email: &str) -> String {
        let resp = call(desk, "auth/login", json!({ "email": email, "password": "demo" })).await;
        content(&resp)["token"].as_str().unwrap().to_string()
    }

    // ── JSON-RPC envelope ───────────────────────────────────────────────────
    #[tokio::test]
    async fn jsonrpc_unknown_method_returns_error() {
        let desk = test_desk();
        let resp = handle_rpc_request(
            desk,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "nonexistent" }),
        )
        .await;
        assert_eq!(resp["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn jsonrpc_unknown_tool_returns_error() {
        let desk = test_desk();
        let resp = call(&desk, "delete_everything", json!({})).await;
        assert_eq!(resp["error"]["data"]["kind"], "NOT_FOUND");
        let resp = call(&desk, "admin/delete_everything", json!({})).await;
        assert!(resp.get("error").is_some());
    }

    #[tokio::test]
    async fn jsonrpc_id_is_echoed_in_response() {
        let desk = test_desk();
        let resp = call(&desk, "auth/whoami", json!({ "session": "none" })).await;
        assert_eq!(resp["id"], 7);
        assert!(content(&resp)["user"].is_null());
    }

    #[tokio::test]
    async fn tools_list_names_every_tool() {
        let desk = test_desk();
        let resp = handle_rpc_request(
            desk,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }),
        )
        .await;
        let tools = resp["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), TOOLS.len());
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert!(names.contains(&"admin/escalate"));
        assert!(names.contains(&"confirm"));
    }

    // ── Auth ────────────────────────────────────────────────────────────────
    #[tokio::test]
    async fn login_failure_maps_to_auth_error() {
        let desk = test_desk();
        let resp = call(
            &desk,
            "auth/login",
            json!({ "email": "student@demo.com", "password": "wrong" }),
        )
        .await;
        assert_eq!(resp["error"]["code"], -32001);
        assert_eq!(resp["error"]["data"]["kind"], "AUTH_ERROR");
    }

    #[tokio::test]
    async fn register_ignores_requested_role() {
        let desk = test_desk();
        let resp = call(
            &desk,
            "auth/register",
            json!({
                "name": "Sneaky", "email": "sneaky@uni.edu",
                "password": "secret1", "role": "superadmin"
            }),
        )
        .await;
        assert_eq!(content(&resp)["user"]["role"], "student");
    }

    #[tokio::test]
    async fn whoami_reports_landing_page() {
        let desk = test_desk();
        let token = login(&desk, "admin@demo.com").await;
        let resp = call(&desk, "auth/whoami", json!({ "session": token })).await;
        assert_eq!(content(&resp)["landingPage"], "normal_admin");
    }

    #[tokio::test]
    async fn role_tools_require_matching_session() {
        let desk = test_desk();
        let student = login(&desk, "student@demo.com").await;

        let args = json!({ "session": student, "caseId": "G-1024" });
        let resp = call(&desk, "admin/escalate", args).await;
        assert_eq!(resp["error"]["code"], -32003);
        assert_eq!(desk.cases.get_by_id("G-1024").unwrap().priority.label(), "Critical");
        assert_eq!(desk.cases.get_by_id("G-1024").unwrap().status.label(), "In Progress");

        let resp = call(&desk, "student/my_cases", json!({})).await;
        assert_eq!(resp["error"]["code"], -32001);
    }

    #[tokio::test]
    async fn logout_invalidates_session() {
        let desk = test_desk();
        let token = login(&desk, "student@demo.com").await;
        call(&desk, "auth/logout", json!({ "session": token })).await;
        let resp = call(&desk, "student/my_cases", json!({ "session": token })).await;
        assert_eq!(resp["error"]["data"]["kind"], "AUTH_ERROR");
    }

    #[tokio::test]
    async fn change_password_validation_surfaces() {
        let desk = test_desk();
        let token = login(&desk, "student@demo.com").await;
        let resp = call(
            &desk,
            "auth/change_password",
            json!({ "session": token, "current": "demo", "new": "abc", "confirm": "abc" }),
        )
        .await;
        assert_eq!(resp["error"]["code"], -32602);
        let resp = call(
            &desk,
            "auth/change_password",
            json!({ "session": token, "current": "demo", "new": "abcdef", "confirm": "abcdef" }),
        )
        .await;
        assert_eq!(content(&resp)["changed"], true);
    }

    // ── End-to-end scenarios ────────────────────────────────────────────────
    #[tokio::test]
    async fn scenario_file_case() {
        let desk = test_desk();
        let token = login(&desk, "student@demo.com").await;
        let resp = call(
            &desk,
            "student/file_case",
            json!({ "session": token, "category": "Hostel", "subject": "Leaking pipe" }),
        )
        .await;
        let c = content(&resp);
        assert_eq!(c["status"], "Open");
        assert_eq!(c["priority"], "Medium");
        assert_eq!(c["department"], "Hostel");
        assert_eq!(c["messages"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn scenario_file_case_without_subject_is_rejected() {
        let desk = test_desk();
        let token = login(&desk, "student@demo.com").await;
        let resp = call(
            &desk,
            "student/file_case",
            json!({ "session": token, "category": "Hostel", "subject": "  " }),
        )
        .await;
        assert_eq!(resp["error"]["data"]["kind"], "VALIDATION_ERROR");
        assert_eq!(desk.cases.len(), 3);
    }

    #[tokio::test]
    async fn scenario_student_reply() {
        let desk = test_desk();
        let token = login(&desk, "student@demo.com").await;
        let before = desk.cases.get_by_id("G-1024").unwrap().messages.len();
        let resp = call(
            &desk,
            "student/reply",
            json!({ "session": token, "caseId": "G-1024", "text": "Update?" }),
        )
        .await;
        let messages = content(&resp)["case"]["messages"].as_array().unwrap().clone();
        assert_eq!(messages.len(), before + 1);
        assert_eq!(messages.last().unwrap()["sender"], "Student");
        assert_eq!(messages.last().unwrap()["text"], "Update?");
    }

    #[tokio::test]
    async fn scenario_admin_escalates() {
        let desk = test_desk();
        let token = login(&desk, "admin@demo.com").await;
        let args = json!({ "session": token, "caseId": "G-1024" });
        let resp = call(&desk, "admin/escalate", args).await;
        let c = content(&resp);
        assert_eq!(c["case"]["status"], "Escalated");
        assert_eq!(c["case"]["priority"], "Critical");
    }

    #[tokio::test]
    async fn scenario_admin_resolves_with_remark() {
        let desk = test_desk();
        let token = login(&desk, "admin@demo.com").await;
        let resp = call(
            &desk,
            "admin/change_status",
            json!({
                "session": token,
                "caseId": "G-1024",
                "status": "Resolved",
                "remark": "Fixed"
            }),
        )
        .await;
        let c = content(&resp);
        assert_eq!(c["case"]["status"], "Resolved");
        let messages = c["case"]["messages"].as_array().unwrap();
        assert_eq!(messages.last().unwrap()["text"], "[Status: Resolved] Fixed");
    }

    #[tokio::test]
    async fn scenario_missing_case_is_not_found() {
        let desk = test_desk();
        let token = login(&desk, "admin@demo.com").await;
        let args = json!({ "session": token, "caseId": "G-9999" });
        let resp = call(&desk, "admin/open_case", args).await;
        assert_eq!(resp["error"]["code"], -32004);
        assert_eq!(desk.cases.len(), 3);
    }

    // ── Transitions over the wire ───────────────────────────────────────────
    #[tokio::test]
    async fn status_change_without_remark_is_rejected() {
        let desk = test_desk();
        let token = login(&desk, "admin@demo.com").await;
        let resp = call(
            &desk,
            "admin/change_status",
            json!({ "session": token, "caseId": "G-1024", "status": "Resolved" }),
        )
        .await;
        assert_eq!(resp["error"]["data"]["kind"], "VALIDATION_ERROR");
        assert_eq!(desk.cases.get_by_id("G-1024").unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn stale_expected_version_conflicts() {
        let desk = test_desk();
        let token = login(&desk, "admin@demo.com").await;
        let resp = call(
            &desk,
            "admin/reply",
            json!({ "session": token, "caseId": "G-1085", "text": "on it", "expectedVersion": 1 }),
        )
        .await;
        assert_eq!(content(&resp)["case"]["version"], 2);
        let resp = call(
            &desk,
            "admin/escalate",
            json!({ "session": token, "caseId": "G-1085", "expectedVersion": 1 }),
        )
        .await;
        assert_eq!(resp["error"]["data"]["kind"], "CONFLICT");
    }

    #[tokio::test]
    async fn resolve_round_trip_through_confirm() {
        let desk = test_desk();
        let token = login(&desk, "super@demo.com").await;
        let resp = call(
            &desk,
            "superadmin/request_resolve",
            json!({ "session": token, "caseId": "G-1099" }),
        )
        .await;
        let confirm_token = content(&resp)["token"].as_str().unwrap().to_string();
        assert_eq!(desk.cases.get_by_id("G-1099").unwrap().status.label(), "Escalated");

        let resp = call(
            &desk,
            "confirm",
            json!({ "session": token, "token": confirm_token, "accept": true }),
        )
        .await;
        let outcome = content(&resp);
        assert_eq!(outcome["outcome"], "resolved");
        assert_eq!(outcome["case"]["case"]["status"], "Resolved");

        let resp = call(
            &desk,
            "confirm",
            json!({ "session": token, "token": confirm_token, "accept": true }),
        )
        .await;
        assert_eq!(resp["error"]["code"], -32004);
    }

    #[tokio::test]
    async fn students_cannot_confirm() {
        let desk = test_desk();
        let admin = login(&desk, "admin@demo.com").await;
        let student = login(&desk, "student@demo.com").await;
        let args = json!({ "session": admin, "caseId": "G-1085" });
        let resp = call(&desk, "admin/request_resolve", args).await;
        let confirm_token = content(&resp)["token"].as_str().unwrap().to_string();
        let resp = call(
            &desk,
            "confirm",
            json!({ "session": student, "token": confirm_token, "accept": true }),
        )
        .await;
        assert!(resp.get("error").is_some());
        assert_eq!(desk.cases.get_by_id("G-1085").unwrap().status.label(), "Open");
    }

    #[tokio::test]
    async fn superadmin_manages_admins_over_rpc() {
        let desk = test_desk();
        let token = login(&desk, "super@demo.com").await;
        let resp = call(
            &desk,
            "superadmin/create_admin",
            json!({
                "session": token, "name": "Finance Officer",
                "email": "finance@demo.com", "department": "Finance", "password": "ledger1"
            }),
        )
        .await;
        let admin_id = content(&resp)["id"].as_str().unwrap().to_string();

        let resp = call(
            &desk,
            "superadmin/update_admin",
            json!({ "session": token, "adminId": admin_id, "name": "Chief Accountant" }),
        )
        .await;
        assert_eq!(content(&resp)["name"], "Chief Accountant");

        let resp = call(&desk, "superadmin/admins", json!({ "session": token })).await;
        assert_eq!(content(&resp).as_array().unwrap().len(), 2);

        let resp = call(
            &desk,
            "superadmin/request_delete_admin",
            json!({ "session": token, "adminId": admin_id }),
        )
        .await;
        let confirm_token = content(&resp)["token"].as_str().unwrap().to_string();
        let resp = call(
            &desk,
            "confirm",
            json!({ "session": token, "token": confirm_token, "accept": true }),
        )
        .await;
        assert_eq!(content(&resp)["outcome"], "deleted");
        assert!(desk.directory.get(&admin_id).is_none());
    }

    #[tokio::test]
    async fn long_reply_is_rejected() {
        let desk = test_desk();
        let token = login(&desk, "student@demo.com").await;
        let resp = call(
            &desk,
            "student/reply",
            json!({ "session": token, "caseId": "G-1024", "text": "x".repeat(MAX_TEXT_LEN + 1) }),
        )
        .await;
        assert_eq!(resp["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn long_remark_is_rejected_before_touching_thread() {
        let desk = test_desk();
        let token = login(&desk, "admin@demo.com").await;
        let resp = call(
            &desk,
            "admin/change_status",
            json!({
                "session": token,
                "caseId": "G-1024",
                "status": "Resolved",
                "remark": "r".repeat(MAX_TEXT_LEN + 1)
            }),
        )
        .await;
        assert_eq!(resp["error"]["code"], -32602);
        let c = desk.cases.get_by_id("G-1024").unwrap();
        assert_eq!(c.status.label(), "In Progress");
        assert_eq!(c.messages.len(), 2);
    }

    #[tokio::test]
    async fn subject_limit_counts_characters() {
        let desk = test_desk();
        let token = login(&desk, "student@demo.com").await;
        // 200 two-byte characters fit; one more does not.
        let resp = call(
            &desk,
            "student/file_case",
            json!({ "session": token, "category": "Hostel", "subject": "é".repeat(200) }),
        )
        .await;
        assert_eq!(content(&resp)["status"], "Open");
        let resp = call(
            &desk,
            "student/file_case",
            json!({ "session": token, "category": "Hostel", "subject": "é".repeat(201) }),
        )
        .await;
        assert_eq!(resp["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn oversized_category_is_rejected() {
        let desk = test_desk();
        let token = login(&desk, "student@demo.com").await;
        let resp = call(
            &desk,
            "student/file_case",
            json!({
                "session": token,
                "category": "c".repeat(MAX_CATEGORY_LEN + 1),
                "subject": "Noise"
            }),
        )
        .await;
        assert_eq!(resp["error"]["data"]["kind"], "VALIDATION_ERROR");
        assert_eq!(desk.cases.len(), 3);
    }

    #[tokio::test]
    async fn escalating_via_change_status_forces_critical() {
        let desk = test_desk();
        let token = login(&desk, "admin@demo.com").await;
        let resp = call(
            &desk,
            "admin/change_status",
            json!({
                "session": token,
                "caseId": "G-1085",
                "status": "Escalated",
                "remark": "Needs the dean"
            }),
        )
        .await;
        assert_eq!(content(&resp)["case"]["priority"], "Critical");
        let resp = call(
            &desk,
            "admin/set_priority",
            json!({ "session": token, "caseId": "G-1085", "priority": "High" }),
        )
        .await;
        assert_eq!(resp["error"]["data"]["kind"], "INVALID_TRANSITION");
    }

    // Concurrent replies on one case: every append lands and the version
    // counts them all.
    #[tokio::test]
    async fn concurrent_replies_all_land() {
        use std::sync::{Arc, Barrier};

        let desk = test_desk();
        let barrier = Arc::new(Barrier::new(4));
        let mut handles = Vec::new();
        for i in 0..4 {
            let d = desk.clone();
            let b = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                b.wait();
                for j in 0..25 {
                    d.cases
                        .append_message("G-1085", "Admin", &format!("{}-{}", i, j), None)
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let c = desk.cases.get_by_id("G-1085").unwrap();
        assert_eq!(c.messages.len(), 100);
        assert_eq!(c.version, 101);
    }
}
