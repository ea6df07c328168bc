use anyhow::{anyhow, bail};
use reqwest::Client;
use serde_json::{json, Value};

const DEFAULT_RPC_URL: &str = "http://localhost:8000/rpc";

struct Desk {
    url: String,
    client: Client,
    next_id: u64,
}

impl Desk {
    fn new(url: String) -> Self {
        Desk {
            url,
            client: Client::new(),
            next_id: 1,
        }
    }

    /// Call a tool and unwrap the text content, or fail with the RPC error.
    async fn call(&mut self, name: &str, arguments: Value) -> anyhow::Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": self.next_id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        });
        self.next_id += 1;

        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .json::<Value>()
            .await?;

        if let Some(err) = resp.get("error") {
            bail!("{} failed: {}", name, err);
        }
        let text = resp
            .get("result")
            .and_then(|r| r.get("content"))
            .and_then(|c| c.get(0))
            .and_then(|t| t.get("text"))
            .and_then(|s| s.as_str())
            .ok_or_else(|| anyhow!("{}: unexpected response {}", name, resp))?;
        Ok(serde_json::from_str(text)?)
    }

    /// Call a tool that is expected to fail; returns the error kind.
    async fn expect_error(&mut self, name: &str, arguments: Value) -> anyhow::Result<String> {
        match self.call(name, arguments).await {
            Ok(v) => bail!("{} unexpectedly succeeded: {}", name, v),
            Err(e) => Ok(e.to_string()),
        }
    }

    async fn login(&mut self, email: &str) -> anyhow::Result<String> {
        let session = self
            .call("auth/login", json!({ "email": email, "password": "demo" }))
            .await?;
        let token = session["token"]
            .as_str()
            .ok_or_else(|| anyhow!("login returned no token"))?
            .to_string();
        println!(
            "[auth] {} logged in as {} -> {}",
            email, session["user"]["role"], session["user"]["name"]
        );
        Ok(token)
    }
}

fn check(label: &str, ok: bool) -> anyhow::Result<()> {
    if ok {
        println!("  ok   {}", label);
        Ok(())
    } else {
        bail!("FAILED {}", label)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::var("RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());
    println!("Walking through grievance-desk at {}", url);
    println!("Ensure the server is running with demo data seeded");

    let mut desk = Desk::new(url);
    let student = desk.login("student@demo.com").await?;
    let admin = desk.login("admin@demo.com").await?;
    let superadmin = desk.login("super@demo.com").await?;

    println!("\n--- File a case ---");
    let filed = desk
        .call(
            "student/file_case",
            json!({ "session": student, "category": "Hostel", "subject": "Leaking pipe" }),
        )
        .await?;
    println!("  filed {}", filed["id"]);
    check("status is Open", filed["status"] == "Open")?;
    check("priority is Medium", filed["priority"] == "Medium")?;
    check("department is Hostel", filed["department"] == "Hostel")?;
    check(
        "thread is empty",
        filed["messages"].as_array().map(|m| m.is_empty()).unwrap_or(false),
    )?;

    println!("\n--- Student follows up on G-1024 ---");
    let before = desk
        .call("student/open_case", json!({ "session": student, "caseId": "G-1024" }))
        .await?;
    let before_len = before["case"]["messages"].as_array().map(|m| m.len()).unwrap_or(0);
    let after = desk
        .call(
            "student/reply",
            json!({ "session": student, "caseId": "G-1024", "text": "Update?" }),
        )
        .await?;
    let thread = after["case"]["messages"].as_array().cloned().unwrap_or_default();
    check("thread grew by one", thread.len() == before_len + 1)?;
    check(
        "last entry is the student's",
        thread.last().map(|m| m["sender"] == "Student" && m["text"] == "Update?") == Some(true),
    )?;

    println!("\n--- Admin escalates G-1024 ---");
    let escalated = desk
        .call("admin/escalate", json!({ "session": admin, "caseId": "G-1024" }))
        .await?;
    check("status is Escalated", escalated["case"]["status"] == "Escalated")?;
    check("priority is Critical", escalated["case"]["priority"] == "Critical")?;

    println!("\n--- Admin resolves the new case with a remark ---");
    let err = desk
        .expect_error(
            "admin/change_status",
            json!({ "session": admin, "caseId": filed["id"], "status": "Resolved", "remark": " " }),
        )
        .await?;
    println!("  blank remark rejected: {}", err);
    let resolved = desk
        .call(
            "admin/change_status",
            json!({
                "session": admin,
                "caseId": filed["id"],
                "status": "Resolved",
                "remark": "Fixed"
            }),
        )
        .await?;
    check("status is Resolved", resolved["case"]["status"] == "Resolved")?;
    let last_text = resolved["case"]["messages"]
        .as_array()
        .and_then(|m| m.last())
        .map(|m| m["text"].clone())
        .unwrap_or(Value::Null);
    check("remark recorded", last_text == "[Status: Resolved] Fixed")?;

    println!("\n--- Lookup of a missing case ---");
    let err = desk
        .expect_error("admin/open_case", json!({ "session": admin, "caseId": "G-9999" }))
        .await?;
    check("G-9999 is not found", err.contains("NOT_FOUND"))?;

    println!("\n--- Superadmin closes the escalation ---");
    let queue = desk
        .call("superadmin/escalated", json!({ "session": superadmin }))
        .await?;
    println!(
        "  {} cases need attention",
        queue.as_array().map(|q| q.len()).unwrap_or(0)
    );
    let prompt = desk
        .call(
            "superadmin/request_resolve",
            json!({ "session": superadmin, "caseId": "G-1024" }),
        )
        .await?;
    println!("  {}: {}", prompt["title"], prompt["message"]);
    let outcome = desk
        .call(
            "confirm",
            json!({ "session": superadmin, "token": prompt["token"], "accept": true }),
        )
        .await?;
    check("confirmation resolved the case", outcome["outcome"] == "resolved")?;

    println!("\nWalkthrough complete.");
    Ok(())
}
