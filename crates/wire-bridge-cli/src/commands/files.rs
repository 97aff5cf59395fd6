use anyhow::Result;
use console::style;
use wire_bridge_core::{Bridge, FileStorage, NodeKind};

use crate::ui;

pub async fn run(bridge: &Bridge, user: &str, json: bool) -> Result<()> {
    let nodes = bridge.files.list(user).await?;
    if json {
        return ui::print_json(&nodes);
    }
    if nodes.is_empty() {
        ui::info(&format!(
            "No files. Put some under {}",
            bridge.files.user_root(user)?.display()
        ));
        return Ok(());
    }

    ui::header(&format!("{} entries", nodes.len()));
    for node in &nodes {
        let (path, size) = match node.kind {
            NodeKind::Folder => (style(format!("{}/", node.path)).blue().to_string(), String::new()),
            NodeKind::File => (node.path.clone(), human_size(node.size)),
        };
        println!("  {:>6}  {:<50} {}", style(node.id).dim(), path, style(size).dim());
    }
    println!();
    Ok(())
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MB");
    }
}
