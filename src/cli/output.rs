use crate::loader::{EntrySnapshot, LinkStatus, ModuleKey, SlotStatus};

/// Print program output produced by module bodies
pub fn print_program_output(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

/// Print every registry entry with its phase progress and dependencies
pub fn print_registry(entries: &[EntrySnapshot]) {
    println!("Module registry ({} entries)", entries.len());
    println!("================================================");
    for entry in entries {
        let marker = match (entry.link, entry.evaluated) {
            (LinkStatus::Failed, _) => "❌",
            (_, true) => "✅",
            _ => "•",
        };
        println!("{marker} {} [{}]", entry.key, entry.state);
        println!(
            "    fetch: {}  instantiate: {}  satisfy: {}",
            slot_label(entry.fetch),
            slot_label(entry.instantiate),
            slot_label(entry.satisfy)
        );
        for dep in &entry.dependencies {
            println!("    -> {dep}");
        }
        if let Some(error) = &entry.link_error {
            println!("    link error: {error}");
        }
    }
}

pub fn print_cycles(cycles: &[Vec<ModuleKey>]) {
    if cycles.is_empty() {
        return;
    }

    println!();
    println!("Circular dependencies ({}):", cycles.len());
    for cycle in cycles {
        let members: Vec<&str> = cycle.iter().map(|key| key.as_str()).collect();
        println!("  • {}", members.join(" <-> "));
    }
}

fn slot_label(status: SlotStatus) -> &'static str {
    match status {
        SlotStatus::NotStarted => "-",
        SlotStatus::InFlight => "pending",
        SlotStatus::Succeeded => "ok",
        SlotStatus::Failed => "failed",
    }
}
