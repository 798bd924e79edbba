//! Initialize a new Augur project

use anyhow::Result;
use augur_core::naming::pascal_case;
use std::fs;
use std::path::Path;

/// Run the init command
pub fn run(path: &str, name: Option<&str>, force: bool) -> Result<()> {
    let project_dir = Path::new(path);

    // Create directory if it doesn't exist
    if !project_dir.exists() {
        fs::create_dir_all(project_dir)?;
    }

    // Get absolute path for deriving name
    let abs_path = project_dir.canonicalize()?;

    // Derive project name from directory name if not provided
    let project_name = match name {
        Some(n) => n.to_string(),
        None => abs_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Could not determine project name from path"))?,
    };

    // Check if already initialized
    if project_dir.join("augur.yaml").exists() && !force {
        anyhow::bail!(
            "Directory '{}' already contains an augur.yaml (use --force to overwrite)",
            project_dir.display()
        );
    }

    tracing::info!("Creating new Augur project: {}", project_name);

    fs::create_dir_all(project_dir.join(".augur/ir"))?;
    fs::create_dir_all(project_dir.join(".augur/baselines"))?;

    let config = format!(
        r#"# Augur project configuration
name: {project_name}
ontology_file: ontology.augur

generation:
  out_dir: gen
  stack:
    id: java_spring_jpa

compatibility:
  baseline_ir: .augur/baselines/main.ir.json
  strict_enums: false
  required_tightening: manual_review
"#
    );
    fs::write(project_dir.join("augur.yaml"), config)?;

    let ontology_path = project_dir.join("ontology.augur");
    if !ontology_path.exists() {
        let ontology_name = match pascal_case(&project_name) {
            n if n.starts_with(|c: char| c.is_ascii_alphabetic()) => n,
            _ => "Starter".to_string(),
        };
        fs::write(&ontology_path, starter_ontology(&ontology_name))?;
    }

    let gitignore = r#"# Augur local state
.augur/cache/
.augur/ir/
"#;
    let gitignore_path = project_dir.join(".gitignore");
    if !gitignore_path.exists() {
        fs::write(gitignore_path, gitignore)?;
    }

    println!("Initialized Augur project '{project_name}'.");
    println!("Created:");
    println!("- augur.yaml");
    println!("- ontology.augur");
    println!("- .augur/ir");
    println!("- .augur/baselines");
    println!();
    println!("Next:");
    if path != "." {
        println!("  cd {}", project_dir.display());
    }
    println!("  augur validate    # Check the ontology");
    println!("  augur generate    # Write outputs to gen/");

    Ok(())
}

fn starter_ontology(name: &str) -> String {
    format!(
        r#"# Starter ontology
ontology {name} {{
  version "0.1.0"
  description "Starter ontology"

  object Customer {{
    field customerId {{
      type string
      key primary
    }}
    field email {{
      type string
    }}
  }}

  object Order {{
    field orderId {{
      type string
      key primary
    }}
    field customer {{
      type ref(Customer)
    }}
    field total {{
      type decimal
    }}
    state created {{
      initial
    }}
    state paid {{
    }}
    transition pay {{
      from created
      to paid
    }}
  }}

  action createOrder {{
    kind process
  }}
}}
"#
    )
}
