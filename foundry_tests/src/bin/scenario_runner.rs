//! Content scenario runner with JSON report generation.
//!
//! Builds a scratch data directory with two content packs, loads it through
//! the standard loader, and drives the registry through scripted checks.
//! Prints a summary and writes the results as JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use foundry_core::config::FoundryConfig;
use foundry_core::module::ModuleId;
use foundry_core::preset::Preset;
use foundry_core::registry::Registry;
use foundry_loader::props::{HeavyProp, Prop};
use foundry_loader::{load_all, LoadReport};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let output = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("scenario-report.json"));

    println!("🔩 Foundry Content Scenario Runner");
    println!("==================================\n");

    let scratch = tempfile::tempdir().expect("Failed to create scratch directory");
    write_demo_packs(scratch.path());

    let cfg = FoundryConfig {
        data_dir: scratch.path().to_string_lossy().into_owned(),
        ..FoundryConfig::default()
    };
    let (registry, load) = match load_all(&cfg) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("Scenario data failed to load: {:#}", err);
            std::process::exit(1);
        }
    };

    let mut report = ScenarioReport::default();

    println!("📦 Running module checks...");
    run_module_checks(&mut report, &registry, &load);

    println!("🔍 Running lookup checks...");
    run_lookup_checks(&mut report, &registry);

    println!("🧬 Running copy inheritance checks...");
    run_copy_checks(&mut report, &registry);

    println!("🎨 Running material checks...");
    run_material_checks(&mut report, &registry);

    println!("🎲 Running group and pool checks...");
    run_group_and_pool_checks(&mut report, &registry);

    // Print summary
    println!("\n==================================");
    println!("📊 Scenario Results");
    println!("==================================");
    println!("Total:  {}", report.total);
    println!("Passed: {} ✓", report.passed);
    println!("Failed: {} ✗", report.failed);
    println!("Pass Rate: {:.1}%", report.pass_rate());
    println!("Duration: {:.2}ms", report.duration_ms);

    let json = serde_json::to_string_pretty(&report).expect("Failed to encode report");
    fs::write(&output, json).expect("Failed to save JSON report");
    println!("\n📄 Report saved to: {}", output.display());

    // Exit with appropriate code
    if report.failed > 0 {
        std::process::exit(1);
    }
}

#[derive(Debug, Clone, Serialize)]
struct CheckResult {
    id: String,
    name: String,
    category: String,
    passed: bool,
    duration_ms: f64,
    error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct ScenarioReport {
    total: usize,
    passed: usize,
    failed: usize,
    duration_ms: f64,
    checks: Vec<CheckResult>,
}

impl ScenarioReport {
    fn add(&mut self, check: CheckResult) {
        self.total += 1;
        if check.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.duration_ms += check.duration_ms;
        self.checks.push(check);
    }

    fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.passed as f64 * 100.0 / self.total as f64
        }
    }
}

/// Helper to run one check and capture the result
fn run_check<F>(id: &str, name: &str, category: &str, f: F) -> CheckResult
where
    F: FnOnce() -> Result<(), String>,
{
    let start = Instant::now();
    let result = f();
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    match result {
        Ok(()) => {
            println!("  ✓ {} {}", id, name);
            CheckResult {
                id: id.to_string(),
                name: name.to_string(),
                category: category.to_string(),
                passed: true,
                duration_ms,
                error: None,
            }
        }
        Err(error) => {
            println!("  ✗ {} {}: {}", id, name, error);
            CheckResult {
                id: id.to_string(),
                name: name.to_string(),
                category: category.to_string(),
                passed: false,
                duration_ms,
                error: Some(error),
            }
        }
    }
}

fn write_demo_packs(root: &Path) {
    let base = root.join("Base.pack");
    fs::create_dir_all(&base).expect("Failed to create Base.pack");
    fs::write(
        base.join("Index.ini"),
        "ContentModule\n\
         \tModuleName = Scenario Base\n\
         \tAuthor = Foundry Team\n\
         \tVersion = 1\n\
         \tAddProp = Prop\n\
         \t\tPresetName = Crate\n\
         \t\tMass = 40\n\
         \t\tAddToGroup = Props\n\
         \tAddHeavyProp = HeavyProp\n\
         \t\tPresetName = Bulwark\n\
         \t\tMass = 120\n\
         \t\tPlating = 8\n\
         \t\tAddToGroup = Props\n\
         \tAddMaterial = Material\n\
         \t\tPresetName = Stone\n\
         \t\tIndex = 40\n\
         \t\tFriction = 0.85\n",
    )
    .expect("Failed to write Base.pack index");

    let mods = root.join("Mods.pack");
    fs::create_dir_all(&mods).expect("Failed to create Mods.pack");
    fs::write(
        mods.join("Index.ini"),
        "ContentModule\n\
         \tModuleName = Scenario Mods\n\
         \tRequire = Base.pack\n\
         \tAddProp = Prop\n\
         \t\tPresetName = Crate\n\
         \t\tMass = 90\n\
         \t\tAddToGroup = Props\n\
         \tAddMaterial = Material\n\
         \t\tPresetName = Metal\n\
         \t\tIndex = 40\n\
         \tAddHeavyProp = HeavyProp\n\
         \t\tCopyOf = Base.pack/Bulwark\n\
         \t\tPresetName = Bulwark Mk2\n\
         \t\tPlating = 14\n\
         \t\tRandomWeight = 25\n",
    )
    .expect("Failed to write Mods.pack index");
}

fn run_module_checks(report: &mut ScenarioReport, registry: &Registry, load: &LoadReport) {
    const CATEGORY: &str = "Module Loading";

    // MOD-001: Base module position
    report.add(run_check(
        "MOD-001",
        "Base module sits at load position zero",
        CATEGORY,
        || {
            match registry.find_module("Base.pack") {
                Some(ModuleId(0)) => Ok(()),
                Some(id) => Err(format!("Base.pack landed at position {}", id.0)),
                None => Err("Base.pack was not loaded".to_string()),
            }
        },
    ));

    // MOD-002: Report agrees with the registry
    report.add(run_check(
        "MOD-002",
        "Load report matches the registry",
        CATEGORY,
        || {
            if !load.failed.is_empty() {
                return Err(format!("Packs failed to load: {:?}", load.failed));
            }
            if load.modules.len() != registry.module_count() {
                return Err(format!(
                    "Report lists {} modules, registry holds {}",
                    load.modules.len(),
                    registry.module_count()
                ));
            }
            let stored: usize = (0..registry.module_count())
                .filter_map(|idx| registry.get_module(ModuleId(idx)))
                .map(|module| module.preset_count())
                .sum();
            if load.total_presets != stored {
                return Err(format!(
                    "Report counts {} presets, modules hold {}",
                    load.total_presets, stored
                ));
            }
            Ok(())
        },
    ));
}

fn run_lookup_checks(report: &mut ScenarioReport, registry: &Registry) {
    const CATEGORY: &str = "Lookups";

    // LOOK-001: Exact type and name
    report.add(run_check(
        "LOOK-001",
        "Exact type and name lookup",
        CATEGORY,
        || {
            let preset = registry
                .get_preset("Prop", "Crate", None)
                .ok_or("Crate not found")?;
            let prop = preset
                .as_any()
                .downcast_ref::<Prop>()
                .ok_or("Crate is not a Prop")?;
            if prop.mass() != 40.0 {
                return Err(format!("Expected mass 40, got {}", prop.mass()));
            }
            Ok(())
        },
    ));

    // LOOK-002: Slash paths pin the module
    report.add(run_check(
        "LOOK-002",
        "Module-qualified paths pin the module",
        CATEGORY,
        || {
            let preset = registry
                .get_preset("Prop", "Mods.pack/Crate", None)
                .ok_or("Mods.pack/Crate not found")?;
            let prop = preset
                .as_any()
                .downcast_ref::<Prop>()
                .ok_or("Crate is not a Prop")?;
            if prop.mass() != 90.0 {
                return Err(format!("Expected the Mods.pack Crate, got mass {}", prop.mass()));
            }
            Ok(())
        },
    ));

    // LOOK-003: Plain lookups favor load order
    report.add(run_check(
        "LOOK-003",
        "Plain lookups favor load order",
        CATEGORY,
        || {
            let preset = registry
                .get_preset("Prop", "Crate", None)
                .ok_or("Crate not found")?;
            match preset.common().module() {
                Some(ModuleId(0)) => Ok(()),
                other => Err(format!("Expected the base Crate, got module {:?}", other)),
            }
        },
    ));

    // LOOK-004: Ancestor type queries see descendants
    report.add(run_check(
        "LOOK-004",
        "Ancestor type queries see descendants",
        CATEGORY,
        || {
            let props = registry.get_all_of_type("Prop", None);
            if props.len() != 4 {
                return Err(format!("Expected 4 presets under Prop, got {}", props.len()));
            }
            Ok(())
        },
    ));
}

fn run_copy_checks(report: &mut ScenarioReport, registry: &Registry) {
    const CATEGORY: &str = "Copy Inheritance";

    // COPY-001: Inherit and override
    report.add(run_check(
        "COPY-001",
        "Copies inherit state and apply overrides",
        CATEGORY,
        || {
            let preset = registry
                .get_preset("HeavyProp", "Bulwark Mk2", None)
                .ok_or("Bulwark Mk2 not found")?;
            let heavy = preset
                .as_any()
                .downcast_ref::<HeavyProp>()
                .ok_or("Bulwark Mk2 is not a HeavyProp")?;
            if heavy.mass() != 120.0 {
                return Err(format!("Inherited mass should be 120, got {}", heavy.mass()));
            }
            if heavy.plating() != 14.0 {
                return Err(format!("Overridden plating should be 14, got {}", heavy.plating()));
            }
            if !preset.common().is_in_group("Props") {
                return Err("Group tag was not inherited".to_string());
            }
            Ok(())
        },
    ));

    // COPY-002: The copy is its own preset
    report.add(run_check(
        "COPY-002",
        "Copies register as their own originals",
        CATEGORY,
        || {
            let mk2 = registry
                .get_preset("HeavyProp", "Bulwark Mk2", None)
                .ok_or("Bulwark Mk2 not found")?;
            if !mk2.common().is_original() {
                return Err("Registered copy should count as an original".to_string());
            }
            if mk2.common().module() != registry.find_module("Mods.pack") {
                return Err(format!(
                    "Copy should live in Mods.pack, got {:?}",
                    mk2.common().module()
                ));
            }
            let source = registry
                .get_preset("HeavyProp", "Base.pack/Bulwark", None)
                .ok_or("Bulwark not found")?;
            let heavy = source
                .as_any()
                .downcast_ref::<HeavyProp>()
                .ok_or("Bulwark is not a HeavyProp")?;
            if heavy.plating() != 8.0 {
                return Err("Source preset was modified by the copy".to_string());
            }
            Ok(())
        },
    ));
}

fn run_material_checks(report: &mut ScenarioReport, registry: &Registry) {
    const CATEGORY: &str = "Materials";

    // MAT-001: First claim wins the slot
    report.add(run_check(
        "MAT-001",
        "First claim keeps its declared id",
        CATEGORY,
        || match registry.material_slot_owner(40) {
            Some((ModuleId(0), "Stone")) => Ok(()),
            other => Err(format!("Slot 40 should belong to Stone, got {:?}", other)),
        },
    ));

    // MAT-002: Collisions shift upward and are recorded
    report.add(run_check(
        "MAT-002",
        "Colliding ids shift upward and are recorded",
        CATEGORY,
        || {
            match registry.material_slot_owner(41) {
                Some((_, "Metal")) => {}
                other => return Err(format!("Slot 41 should belong to Metal, got {:?}", other)),
            }
            let mods = registry
                .find_module("Mods.pack")
                .and_then(|id| registry.get_module(id))
                .ok_or("Mods.pack not loaded")?;
            if mods.resolve_material(40) != 41 {
                return Err(format!(
                    "Mods.pack should remap 40 to 41, got {}",
                    mods.resolve_material(40)
                ));
            }
            Ok(())
        },
    ));
}

fn run_group_and_pool_checks(report: &mut ScenarioReport, registry: &Registry) {
    const CATEGORY: &str = "Groups and Pools";

    // GRP-001: Group queries span modules
    report.add(run_check(
        "GRP-001",
        "Group queries span modules",
        CATEGORY,
        || {
            let props = registry.get_all_of_group("Props", "All", None);
            if props.len() != 4 {
                return Err(format!("Expected 4 presets in Props, got {}", props.len()));
            }
            Ok(())
        },
    ));

    // GRP-002: Weighted picks stay inside the group
    report.add(run_check(
        "GRP-002",
        "Weighted random picks stay in the group",
        CATEGORY,
        || {
            for _ in 0..10 {
                let pick = registry
                    .random_of_group("Props", "Prop", None)
                    .ok_or("No pick from Props")?;
                if !pick.common().is_in_group("Props") {
                    return Err(format!(
                        "Picked \"{}\" which is not in Props",
                        pick.common().preset_name()
                    ));
                }
            }
            Ok(())
        },
    ));

    // POOL-001: Pools refill in whole batches
    report.add(run_check(
        "POOL-001",
        "Instance pools refill in whole batches",
        CATEGORY,
        || {
            let stats = registry
                .types()
                .pool_stats("Prop")
                .ok_or("Prop has no pool")?;
            if stats.refills < 1 {
                return Err("Loading should have refilled the Prop pool".to_string());
            }
            if stats.built % 10 != 0 {
                return Err(format!("Built {} is not a whole batch multiple", stats.built));
            }
            if stats.in_use != 2 {
                return Err(format!("Expected 2 live Prop instances, got {}", stats.in_use));
            }
            Ok(())
        },
    ));

    // POOL-002: Released clones return to the pool
    report.add(run_check(
        "POOL-002",
        "Released clones return to the pool",
        CATEGORY,
        || {
            let before = registry
                .types()
                .pool_stats("HeavyProp")
                .ok_or("HeavyProp has no pool")?;
            let source = registry
                .get_preset("HeavyProp", "Bulwark", None)
                .ok_or("Bulwark not found")?;
            let copy = registry
                .types()
                .clone_preset(source)
                .map_err(|err| format!("Clone failed: {:#}", err))?;
            drop(copy);
            let after = registry
                .types()
                .pool_stats("HeavyProp")
                .ok_or("HeavyProp has no pool")?;
            if after.in_use != before.in_use {
                return Err(format!(
                    "Pool should be back to {} live instances, got {}",
                    before.in_use, after.in_use
                ));
            }
            Ok(())
        },
    ));
}
