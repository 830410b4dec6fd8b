//! valuer-cli, a command-line frontend for the Valuer HTTP API
//!
//! # Subcommands
//! - `predict --area --bedrooms --bathrooms --location --age [--json]`
//! - `history [-n <limit>]`         : recent predictions, newest first
//! - `models`                       : saved model snapshots
//! - `save <name>` / `load <id>` / `delete <id>`
//! - `metrics <model-id>`           : performance summary for one model
//! - `feedback --prediction --rating [--comment]`
//! - `importance [-n <limit>]`      : feature importance over recent predictions
//! - `status`                       : show server health

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";
const DEFAULT_HISTORY: u32 = 10;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "valuer-cli", version, about = "Valuer property price estimates")]
struct Cli {
    /// Valuer HTTP server URL (overrides VALUER_HTTP_URL env var)
    #[arg(long, env = "VALUER_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Estimate the price of a property
    Predict {
        /// Living area in square feet
        #[arg(long)]
        area: Option<f64>,

        #[arg(long)]
        bedrooms: Option<f64>,

        #[arg(long)]
        bathrooms: Option<f64>,

        /// Downtown, Suburban or Rural
        #[arg(long)]
        location: Option<String>,

        /// Property age in years
        #[arg(long)]
        age: Option<f64>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show recent predictions
    History {
        #[arg(short = 'n', long, default_value_t = DEFAULT_HISTORY)]
        limit: u32,
    },

    /// List saved models
    Models,

    /// Save the current model under a name
    Save { name: String },

    /// Make a saved model current
    Load { id: String },

    /// Delete a saved model
    Delete { id: String },

    /// Performance summary for a model
    Metrics { id: String },

    /// Rate a prediction
    Feedback {
        /// The predicted price being rated
        #[arg(long)]
        prediction: f64,

        /// 1 (way off) to 5 (spot on)
        #[arg(long)]
        rating: u8,

        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Feature importance over recent predictions
    Importance {
        #[arg(short = 'n', long, default_value_t = DEFAULT_HISTORY)]
        limit: u32,
    },

    /// Show Valuer server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionView {
    pub id: Option<i64>,
    pub price: i64,
    pub model_name: String,
    pub is_fallback: bool,
    pub timestamp: i64,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentView {
    pub is_valid: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct PredictResponse {
    pub record: PredictionView,
    pub assessment: AssessmentView,
}

#[derive(Debug, Deserialize)]
pub struct ModelView {
    pub id: String,
    pub name: String,
    pub timestamp: i64,
}

// ============================================================================
// Formatting
// ============================================================================

/// Whole dollars with thousands separators, e.g. `$1,250,000`.
pub fn format_price(price: i64) -> String {
    let digits = price.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if price < 0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

/// One line per prediction for `history`.
pub fn format_history_row(p: &PredictionView) -> String {
    let id = p.id.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string());
    let source = if p.is_fallback { "formula" } else { "model" };
    format!(
        "#{:<5} {:>12}  {} ({})",
        id,
        format_price(p.price),
        p.model_name,
        source
    )
}

/// Field messages from a 400 body, as `field: message` lines.
pub fn field_errors(body: &serde_json::Value) -> Vec<String> {
    body["fields"]
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v.as_str().unwrap_or("invalid")))
                .collect()
        })
        .unwrap_or_default()
}

/// Importance entries sorted by weight, largest first, each with a bar.
pub fn format_importance(importance: &BTreeMap<String, f64>) -> Vec<String> {
    let mut entries: Vec<(&String, &f64)> = importance.iter().collect();
    entries.sort_by(|a, b| b.1.total_cmp(a.1));
    entries
        .into_iter()
        .map(|(name, pct)| {
            let bar = "#".repeat((pct / 5.0).round().max(0.0) as usize);
            format!("{:<18} {:>5.1}% {}", name, pct, bar)
        })
        .collect()
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client() -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?)
}

/// Send a request and return the JSON body of a successful response.
/// Connection failures and error statuses end the process.
fn call(request: reqwest::blocking::RequestBuilder, url: &str) -> serde_json::Value {
    let resp = match request.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("valuer-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let body: serde_json::Value = resp.json().unwrap_or_default();

    if status == reqwest::StatusCode::BAD_REQUEST {
        eprintln!("valuer-cli: invalid input");
        for line in field_errors(&body) {
            eprintln!("  {}", line);
        }
        std::process::exit(2);
    }
    if !status.is_success() {
        eprintln!(
            "valuer-cli: server returned {}: {}",
            status,
            body["error"].as_str().unwrap_or("unknown error")
        );
        std::process::exit(1);
    }
    body
}

fn parse<T: serde::de::DeserializeOwned>(body: serde_json::Value, what: &str) -> T {
    match serde_json::from_value(body) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("valuer-cli: failed to parse {} response: {}", what, e);
            std::process::exit(1);
        }
    }
}

fn do_predict(server: &str, form: serde_json::Value, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/predict", server);
    let body = call(client()?.post(&url).json(&form), &url);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let resp: PredictResponse = parse(body, "predict");
    println!("Estimated price: {}", format_price(resp.record.price));
    println!("Model:           {}", resp.record.model_name);
    if resp.record.is_fallback {
        println!(
            "Note:            formula estimate ({})",
            resp.record.error.as_deref().unwrap_or("model unavailable")
        );
    }
    if !resp.assessment.is_valid {
        println!("Warning:         {}", resp.assessment.message);
    }
    Ok(())
}

fn do_history(server: &str, limit: u32) -> anyhow::Result<()> {
    let url = format!("{}/history?limit={}", server, limit);
    let rows: Vec<PredictionView> = parse(call(client()?.get(&url), &url), "history");
    if rows.is_empty() {
        eprintln!("No predictions yet");
        return Ok(());
    }
    for row in &rows {
        println!("{}", format_history_row(row));
    }
    Ok(())
}

fn do_models(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/models", server);
    let models: Vec<ModelView> = parse(call(client()?.get(&url), &url), "models");
    if models.is_empty() {
        eprintln!("No saved models");
        return Ok(());
    }
    for m in &models {
        println!("{:<24} {:<24} {}", m.id, m.name, m.timestamp);
    }
    Ok(())
}

fn do_save(server: &str, name: &str) -> anyhow::Result<()> {
    let url = format!("{}/models", server);
    let body = call(
        client()?.post(&url).json(&serde_json::json!({ "name": name })),
        &url,
    );
    println!("Saved model {}", body["id"].as_str().unwrap_or("?"));
    Ok(())
}

fn do_load(server: &str, id: &str) -> anyhow::Result<()> {
    let url = format!("{}/models/{}/load", server, id);
    call(client()?.post(&url), &url);
    println!("Loaded model {}", id);
    Ok(())
}

fn do_delete(server: &str, id: &str) -> anyhow::Result<()> {
    let url = format!("{}/models/{}", server, id);
    call(client()?.delete(&url), &url);
    println!("Deleted model {}", id);
    Ok(())
}

fn do_metrics(server: &str, id: &str) -> anyhow::Result<()> {
    let url = format!("{}/models/{}/metrics", server, id);
    let body = call(client()?.get(&url), &url);
    println!("Predictions:  {}", body["totalPredictions"]);
    println!(
        "Avg price:    {}",
        format_price(body["avgPrice"].as_f64().unwrap_or(0.0).round() as i64)
    );
    if let Some(breakdown) = body["locationBreakdown"].as_object() {
        for (location, stats) in breakdown {
            println!(
                "  {:<10} {:>4} × {}",
                location,
                stats["count"],
                format_price(stats["average"].as_f64().unwrap_or(0.0).round() as i64)
            );
        }
    }
    Ok(())
}

fn do_feedback(server: &str, prediction: f64, rating: u8, comment: &str) -> anyhow::Result<()> {
    let url = format!("{}/feedback", server);
    let draft = serde_json::json!({
        "prediction": prediction,
        "rating": rating,
        "comment": comment,
    });
    let body = call(client()?.post(&url).json(&draft), &url);
    println!(
        "Thanks! Feedback #{} recorded",
        body["feedback"]["id"].as_u64().unwrap_or(0)
    );
    Ok(())
}

fn do_importance(server: &str, limit: u32) -> anyhow::Result<()> {
    let url = format!("{}/importance?limit={}", server, limit);
    let importance: BTreeMap<String, f64> =
        parse(call(client()?.get(&url), &url), "importance");
    if importance.is_empty() {
        eprintln!("No predictions yet");
        return Ok(());
    }
    for line in format_importance(&importance) {
        println!("{}", line);
    }
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);
    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Valuer server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:       {}", body["version"].as_str().unwrap_or("?"));
            println!("SQLite:        {}", body["sqlite"].as_str().unwrap_or("?"));
            println!("Schema:        {}", body["schema_version"]);
            println!("Model:         {}", body["model_status"].as_str().unwrap_or("?"));
            println!("Socket:        {}", body["socket"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("valuer-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("valuer-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Predict {
            area,
            bedrooms,
            bathrooms,
            location,
            age,
            json,
        } => {
            let form = serde_json::json!({
                "area": area,
                "bedrooms": bedrooms,
                "bathrooms": bathrooms,
                "location": location,
                "age": age,
            });
            do_predict(&server, form, json)
        }
        Commands::History { limit } => do_history(&server, limit),
        Commands::Models => do_models(&server),
        Commands::Save { name } => do_save(&server, &name),
        Commands::Load { id } => do_load(&server, &id),
        Commands::Delete { id } => do_delete(&server, &id),
        Commands::Metrics { id } => do_metrics(&server, &id),
        Commands::Feedback {
            prediction,
            rating,
            comment,
        } => do_feedback(&server, prediction, rating, &comment),
        Commands::Importance { limit } => do_importance(&server, limit),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("valuer-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: Option<i64>, price: i64, is_fallback: bool) -> PredictionView {
        PredictionView {
            id,
            price,
            model_name: "Default Model".to_string(),
            is_fallback,
            timestamp: 1_700_000_000_000,
            error: None,
        }
    }

    // ========================================================================
    // TEST 1: prices get thousands separators
    // ========================================================================
    #[test]
    fn test_format_price_grouping() {
        assert_eq!(format_price(0), "$0");
        assert_eq!(format_price(950), "$950");
        assert_eq!(format_price(50_000), "$50,000");
        assert_eq!(format_price(1_250_000), "$1,250,000");
        assert_eq!(format_price(-4_500), "-$4,500");
    }

    // ========================================================================
    // TEST 2: history rows mark formula estimates and unsaved records
    // ========================================================================
    #[test]
    fn test_history_row_format() {
        let saved = format_history_row(&view(Some(7), 594_000, false));
        assert!(saved.starts_with("#7"));
        assert!(saved.contains("$594,000"));
        assert!(saved.ends_with("(model)"));

        let unsaved = format_history_row(&view(None, 50_000, true));
        assert!(unsaved.starts_with("#-"));
        assert!(unsaved.ends_with("(formula)"));
    }

    // ========================================================================
    // TEST 3: 400 bodies become field lines; other bodies give none
    // ========================================================================
    #[test]
    fn test_field_errors() {
        let body = serde_json::json!({
            "status": "invalid",
            "fields": {"age": "Property age is required", "area": "Area is required"}
        });
        let lines = field_errors(&body);
        assert_eq!(
            lines,
            vec![
                "age: Property age is required".to_string(),
                "area: Area is required".to_string()
            ]
        );
        assert!(field_errors(&serde_json::json!({"error": "boom"})).is_empty());
    }

    // ========================================================================
    // TEST 4: importance sorted largest first with proportional bars
    // ========================================================================
    #[test]
    fn test_importance_sorted() {
        let mut importance = BTreeMap::new();
        importance.insert("age".to_string(), 10.0);
        importance.insert("area".to_string(), 60.0);
        importance.insert("bedrooms".to_string(), 30.0);

        let lines = format_importance(&importance);
        assert!(lines[0].starts_with("area"));
        assert!(lines[0].ends_with(&"#".repeat(12)));
        assert!(lines[2].starts_with("age"));
    }

    // ========================================================================
    // TEST 5: predict response parses from the server's JSON shape
    // ========================================================================
    #[test]
    fn test_predict_response_parses() {
        let body = serde_json::json!({
            "record": {
                "id": 3,
                "input": {"area": 2000.0, "bedrooms": 3, "bathrooms": 2.0, "location": "Suburban", "age": 10},
                "price": 594000,
                "modelId": "default-model",
                "modelName": "Default Model",
                "isFallback": true,
                "timestamp": 1_700_000_000_000i64,
                "error": "Model not initialized"
            },
            "assessment": {"isValid": true, "message": "Prediction looks reasonable"}
        });
        let resp: PredictResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.record.price, 594_000);
        assert!(resp.record.is_fallback);
        assert!(resp.assessment.is_valid);
    }
}
