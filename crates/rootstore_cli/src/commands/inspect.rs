//! Inspect command implementation.

use super::json::value_to_json;
use rootstore_core::{inspect, MethodKind, RecursionGuard};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Store identity.
    pub store_id: String,
    /// On-disk format version.
    pub format_version: String,
    /// Commit log size in bytes.
    pub log_size: u64,
    /// Latest committed sequence number.
    pub sequence: u64,
    /// Number of committed keys of every kind.
    pub committed_keys: usize,
    /// Number of roots.
    pub root_count: usize,
    /// Number of classes.
    pub class_count: usize,
    /// Number of constants.
    pub constant_count: usize,
    /// Roots and their values (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<Vec<RootInfo>>,
    /// Classes (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<ClassInfo>>,
}

/// One root.
#[derive(Debug, Serialize)]
pub struct RootInfo {
    /// Key, without the leading colon.
    pub key: String,
    /// Rendered value.
    pub value: serde_json::Value,
    /// Inspect string.
    pub inspect: String,
}

/// One class.
#[derive(Debug, Serialize)]
pub struct ClassInfo {
    /// Class name.
    pub name: String,
    /// Instance method selectors.
    pub instance_methods: Vec<String>,
    /// Class method selectors.
    pub class_methods: Vec<String>,
    /// Class variable names.
    pub class_vars: Vec<String>,
    /// Class-instance variable names.
    pub class_instance_vars: Vec<String>,
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    show_roots: bool,
    show_classes: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_existing(path)?;
    let session = store.session()?;
    let snapshot = store.snapshot()?;
    let view = session.view();

    let (major, minor) = store.format_version();
    let mut result = InspectResult {
        path: path.display().to_string(),
        store_id: store.store_id().to_string(),
        format_version: format!("{major}.{minor}"),
        log_size: store.wal().size()?,
        sequence: snapshot.sequence().as_u64(),
        committed_keys: snapshot.len(),
        root_count: view.root_keys().count(),
        class_count: view.classes().len(),
        constant_count: view.constant_names().count(),
        roots: None,
        classes: None,
    };

    if show_roots {
        let roots = view
            .root_keys()
            .filter_map(|key| view.root(key).map(|value| (key, value)))
            .map(|(key, value)| RootInfo {
                key: key.as_str().to_string(),
                value: value_to_json(value, &mut RecursionGuard::new()),
                inspect: inspect(value),
            })
            .collect();
        result.roots = Some(roots);
    }

    if show_classes {
        let classes = view
            .classes()
            .names()
            .filter_map(|name| view.classes().get(name))
            .map(|entry| ClassInfo {
                name: entry.name().to_string(),
                instance_methods: entry.methods(MethodKind::Instance).keys().cloned().collect(),
                class_methods: entry.methods(MethodKind::Class).keys().cloned().collect(),
                class_vars: entry.class_vars().keys().cloned().collect(),
                class_instance_vars: entry.class_instance_vars().keys().cloned().collect(),
            })
            .collect();
        result.classes = Some(classes);
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("rootstore Store Inspection");
    println!("==========================");
    println!();
    println!("Path:           {}", result.path);
    println!("Store ID:       {}", result.store_id);
    println!("Format:         {}", result.format_version);
    println!("Log size:       {} bytes", result.log_size);
    println!("Sequence:       {}", result.sequence);
    println!("Committed keys: {}", result.committed_keys);
    println!();
    println!("Roots:          {}", result.root_count);
    println!("Classes:        {}", result.class_count);
    println!("Constants:      {}", result.constant_count);

    if let Some(ref roots) = result.roots {
        println!();
        println!("Roots");
        println!("-----");
        for root in roots {
            println!("  :{} = {}", root.key, root.inspect);
        }
    }

    if let Some(ref classes) = result.classes {
        println!();
        println!("Classes");
        println!("-------");
        for class in classes {
            println!("  {}", class.name);
            if !class.instance_methods.is_empty() {
                println!("    #{}", class.instance_methods.join(", #"));
            }
            if !class.class_methods.is_empty() {
                println!("    .{}", class.class_methods.join(", ."));
            }
            if !class.class_vars.is_empty() {
                println!("    @@{}", class.class_vars.join(", @@"));
            }
            if !class.class_instance_vars.is_empty() {
                println!("    @{}", class.class_instance_vars.join(", @"));
            }
        }
    }
}
