use reqchain::RequestBuilder;
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let base_url = std::env::var("REQCHAIN_BASE_URL")?;

    let mut api = RequestBuilder::new()
        .base_url(base_url)
        .as_json()
        .accept_json()
        .with_user_agent("reqchain-demo")
        .timeout(10)
        .retry(3, 200);

    let created = api.post("/users", &json!({ "name": "Kit" })).await?;
    println!("POST /users -> {}", created.status());

    let listed = api.get("/users?page=1").await?;
    println!("GET /users -> {} {}", listed.status(), listed.text());

    let removed = api.delete("/users/1").await?;
    println!("DELETE /users/1 -> {}", removed.status());

    Ok(())
}
