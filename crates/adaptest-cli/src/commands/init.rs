//! The `adaptest init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("adaptest.toml").exists() {
        println!("adaptest.toml already exists, skipping.");
    } else {
        std::fs::write("adaptest.toml", SAMPLE_CONFIG)?;
        println!("Created adaptest.toml");
    }

    std::fs::create_dir_all("item-banks")?;
    let example_path = std::path::Path::new("item-banks/example.toml");
    if example_path.exists() {
        println!("item-banks/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_BANK)?;
        println!("Created item-banks/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit adaptest.toml to tune the policy or enable OpenAI contextualization");
    println!("  2. Run: adaptest validate --bank item-banks/example.toml");
    println!("  3. Run: adaptest simulate --bank item-banks/example.toml");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# adaptest configuration

[estimator]
min_information = 0.1
se_min = 0.2
se_max = 2.0

[policy]
precision_threshold = 0.4
max_items = 30
time_budget_secs = 3540
clock_skew_tolerance_secs = 5.0
reservation_ttl_secs = 600

[contextualizer]
type = "passthrough"
# type = "openai"
# api_key = "${OPENAI_API_KEY}"
# model = "gpt-4o-mini"

[engine]
context_max_retries = 2
context_retry_delay_ms = 500
parallelism = 4
"#;

const EXAMPLE_BANK: &str = r#"[bank]
id = "example"
name = "Example Item Bank"
description = "A handful of calibrated algebra items to get started"

[[items]]
id = 1
statement = "Calcula 3 + 4 * 2"
answer = "11"
difficulty = -2.0
tags = ["aritmetica"]

[[items]]
id = 2
statement = "Resuelve 2x + 1 = 5"
answer = "x = 2"
difficulty = -1.0
tags = ["ecuaciones"]

[[items]]
id = 3
statement = "Desarrolla (x + 1)^2"
answer = "x^2 + 2x + 1"
difficulty = 0.0
tags = ["algebra"]

[[items]]
id = 4
statement = "Si f(x) = 2x - 3, calcula f(4)"
answer = "5"
difficulty = 0.5
tags = ["funciones"]

[[items]]
id = 5
statement = "Resuelve log2(x) = 5"
answer = "x = 32"
difficulty = 1.5
tags = ["logaritmos"]
"#;
