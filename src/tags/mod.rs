//! Derived part tags
//!
//! Tags are a regenerable index over part descriptions and group ids. The
//! rule table is static; [`regenerate_tags`] wipes and rebuilds both tag
//! tables from whatever parts are currently stored.

use crate::catalog::humanize_slug;
use crate::storage::SqliteStorage;
use regex::Regex;
use rusqlite::params;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagCategory {
    /// Vehicle system; also matched against the part's group id
    System,
    Component,
    Maintenance,
    Position,
}

impl TagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagCategory::System => "system",
            TagCategory::Component => "component",
            TagCategory::Maintenance => "maintenance",
            TagCategory::Position => "position",
        }
    }
}

struct TagRule {
    id: &'static str,
    category: TagCategory,
    patterns: &'static [&'static str],
}

use TagCategory::{Component, Maintenance, Position, System};

const RULES: &[TagRule] = &[
    TagRule { id: "engine", category: System, patterns: &[r"^engine$"] },
    TagRule {
        id: "transmission",
        category: System,
        patterns: &[r"^automatic-transmission$", r"^transfer$", r"A/T", r"M/T", r"TRANS"],
    },
    TagRule { id: "brakes", category: System, patterns: &[r"^brake$", r"BRAKE"] },
    TagRule {
        id: "suspension",
        category: System,
        patterns: &[r"suspension$", r"SHOCK", r"STRUT", r"SPRING,.*COIL"],
    },
    TagRule {
        id: "steering",
        category: System,
        patterns: &[r"^steering$", r"STEERING", r"POWER STEER"],
    },
    TagRule {
        id: "electrical",
        category: System,
        patterns: &[r"electrical$", r"WIRING", r"HARNESS", r"RELAY", r"FUSE"],
    },
    TagRule {
        id: "cooling",
        category: System,
        patterns: &[r"^cooling$", r"RADIATOR", r"COOLANT", r"THERMOSTAT", r"WATER PUMP"],
    },
    TagRule {
        id: "fuel-system",
        category: System,
        patterns: &[r"^fuel$", r"FUEL", r"INJECTOR", r"CARBURETOR"],
    },
    TagRule {
        id: "exhaust",
        category: System,
        patterns: &[r"EXHAUST", r"MUFFLER", r"CATALYTIC", r"MANIFOLD,.*EXH"],
    },
    TagRule {
        id: "intake",
        category: System,
        patterns: &[r"INTAKE", r"AIR CLEANER", r"THROTTLE", r"MANIFOLD,.*INT"],
    },
    TagRule {
        id: "hvac",
        category: System,
        patterns: &[
            r"heater",
            r"A/C",
            r"ventilation",
            r"BLOWER",
            r"EVAPORATOR",
            r"CONDENSER",
            r"COMPRESSOR,.*A/C",
        ],
    },
    TagRule {
        id: "drivetrain",
        category: System,
        patterns: &[
            r"axle$",
            r"DIFFERENTIAL",
            r"PROPELLER",
            r"DRIVE SHAFT",
            r"CV JOINT",
            r"TRANSFER",
        ],
    },
    TagRule {
        id: "body",
        category: System,
        patterns: &[r"^body$", r"^door$", r"^interior$", r"^exterior$", r"^seat$"],
    },
    TagRule {
        id: "wheels-tires",
        category: System,
        patterns: &[r"^wheel", r"TIRE", r"HUB", r"LUG NUT"],
    },
    TagRule {
        id: "lighting",
        category: System,
        patterns: &[r"HEADL", r"TAIL.*L", r"LAMP", r"LIGHT", r"BULB", r"TURN SIGNAL"],
    },
    TagRule {
        id: "lubrication",
        category: System,
        patterns: &[r"^lubrication$", r"OIL PUMP", r"OIL PAN", r"OIL FILTER"],
    },
    TagRule { id: "gasket", category: Component, patterns: &[r"GASKET"] },
    TagRule { id: "seal", category: Component, patterns: &[r"\bSEAL\b", r"O-RING"] },
    TagRule { id: "bearing", category: Component, patterns: &[r"BEARING"] },
    TagRule { id: "bushing", category: Component, patterns: &[r"BUSHING"] },
    TagRule { id: "filter", category: Component, patterns: &[r"FILTER"] },
    TagRule { id: "belt", category: Component, patterns: &[r"\bBELT\b"] },
    TagRule { id: "hose", category: Component, patterns: &[r"\bHOSE\b"] },
    TagRule { id: "pump", category: Component, patterns: &[r"\bPUMP\b"] },
    TagRule { id: "sensor", category: Component, patterns: &[r"SENSOR", r"SENDER"] },
    TagRule { id: "switch", category: Component, patterns: &[r"SWITCH"] },
    TagRule {
        id: "valve",
        category: Component,
        patterns: &[r"\bVALVE\b", r"\bPCV\b", r"\bEGR\b"],
    },
    TagRule { id: "motor", category: Component, patterns: &[r"\bMOTOR\b", r"ACTUATOR"] },
    TagRule { id: "spring", category: Component, patterns: &[r"\bSPRING\b"] },
    TagRule {
        id: "mount",
        category: Component,
        patterns: &[r"\bMOUNT\b", r"MOUNTING", r"BRACKET", r"INSULATOR"],
    },
    TagRule {
        id: "fastener",
        category: Component,
        patterns: &[
            r"\bBOLT\b",
            r"\bNUT\b",
            r"\bSCREW\b",
            r"\bSTUD\b",
            r"\bWASHER\b",
            r"\bCLIP\b",
            r"\bCLAMP\b",
        ],
    },
    TagRule {
        id: "cover",
        category: Component,
        patterns: &[r"\bCOVER\b", r"\bCAP\b", r"\bLID\b"],
    },
    TagRule { id: "cable", category: Component, patterns: &[r"\bCABLE\b", r"\bWIRE\b"] },
    TagRule {
        id: "piston",
        category: Component,
        patterns: &[r"\bPISTON\b", r"\bRING,.*PISTON"],
    },
    TagRule { id: "clutch", category: Component, patterns: &[r"\bCLUTCH\b"] },
    TagRule {
        id: "rotor-drum",
        category: Component,
        patterns: &[r"\bROTOR\b", r"\bDRUM\b", r"\bDISC\b"],
    },
    TagRule {
        id: "pad-shoe",
        category: Component,
        patterns: &[r"\bPAD\b", r"\bSHOE\b", r"\bLINING\b"],
    },
    TagRule { id: "caliper", category: Component, patterns: &[r"CALIPER"] },
    TagRule { id: "cylinder", category: Component, patterns: &[r"CYLINDER"] },
    TagRule {
        id: "gear",
        category: Component,
        patterns: &[r"\bGEAR\b", r"PINION", r"SPROCKET"],
    },
    TagRule { id: "shaft", category: Component, patterns: &[r"\bSHAFT\b", r"AXLE SHAFT"] },
    TagRule {
        id: "linkage",
        category: Component,
        patterns: &[r"LINKAGE", r"\bROD\b", r"\bARM\b", r"TIE ROD", r"BALL JOINT"],
    },
    TagRule { id: "mirror", category: Component, patterns: &[r"MIRROR"] },
    TagRule {
        id: "glass",
        category: Component,
        patterns: &[r"\bGLASS\b", r"WINDSHIELD", r"WINDOW"],
    },
    TagRule {
        id: "weather-strip",
        category: Component,
        patterns: &[r"WEATHER\s*STRIP", r"MOLDING", r"TRIM"],
    },
    TagRule { id: "handle", category: Component, patterns: &[r"HANDLE", r"KNOB", r"LEVER"] },
    TagRule {
        id: "latch-lock",
        category: Component,
        patterns: &[r"LATCH", r"\bLOCK\b", r"STRIKER"],
    },
    TagRule { id: "wiper", category: Component, patterns: &[r"WIPER"] },
    TagRule {
        id: "spark-plug",
        category: Component,
        patterns: &[r"SPARK PLUG", r"IGNITION", r"COIL,.*IGN", r"DISTRIBUTOR"],
    },
    TagRule {
        id: "starter-alternator",
        category: Component,
        patterns: &[r"STARTER", r"ALTERNATOR", r"GENERATOR"],
    },
    TagRule { id: "battery", category: Component, patterns: &[r"BATTERY"] },
    TagRule {
        id: "maintenance-item",
        category: Maintenance,
        patterns: &[
            r"FILTER",
            r"\bBELT\b",
            r"SPARK PLUG",
            r"\bPAD\b",
            r"\bSHOE\b",
            r"WIPER.*BLADE",
            r"FLUID",
        ],
    },
    TagRule {
        id: "wear-part",
        category: Maintenance,
        patterns: &[
            r"BEARING",
            r"BUSHING",
            r"\bSEAL\b",
            r"GASKET",
            r"O-RING",
            r"\bPAD\b",
            r"\bSHOE\b",
            r"LINING",
            r"CLUTCH.*DISC",
        ],
    },
    TagRule { id: "front", category: Position, patterns: &[r"\bFRONT\b", r"\bFR\b", r"\bFWD\b"] },
    TagRule { id: "rear", category: Position, patterns: &[r"\bREAR\b", r"\bRR\b", r"\bBACK\b"] },
    TagRule { id: "left", category: Position, patterns: &[r"\bLEFT\b", r"\bLH\b", r",LH$"] },
    TagRule { id: "right", category: Position, patterns: &[r"\bRIGHT\b", r"\bRH\b", r",RH$"] },
    TagRule { id: "upper", category: Position, patterns: &[r"\bUPPER\b", r"\bUPR\b", r"\bTOP\b"] },
    TagRule {
        id: "lower",
        category: Position,
        patterns: &[r"\bLOWER\b", r"\bLWR\b", r"\bBOTTOM\b"],
    },
    TagRule { id: "inner", category: Position, patterns: &[r"\bINNER\b", r"\bINR\b"] },
    TagRule { id: "outer", category: Position, patterns: &[r"\bOUTER\b", r"\bOTR\b"] },
];

struct CompiledRule {
    id: &'static str,
    category: TagCategory,
    pattern: Regex,
}

static COMPILED: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|rule| CompiledRule {
            id: rule.id,
            category: rule.category,
            pattern: Regex::new(&format!("(?i)(?:{})", rule.patterns.join("|")))
                .expect("static tag pattern"),
        })
        .collect()
});

/// A tag definition from the rule table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDefinition {
    pub id: &'static str,
    pub name: String,
    pub category: TagCategory,
}

/// Every tag the classifier can produce, in rule-table order
pub fn tag_definitions() -> Vec<TagDefinition> {
    RULES
        .iter()
        .map(|rule| TagDefinition {
            id: rule.id,
            name: humanize_slug(rule.id),
            category: rule.category,
        })
        .collect()
}

/// Tag ids that apply to a part
///
/// Every rule is tested against the description; system rules are also
/// tested against the group id.
///
/// ```
/// use catalog_harvest::tags::classify;
///
/// let tags = classify("GASKET, CYLINDER HEAD", "engine");
/// assert!(tags.contains("gasket"));
/// assert!(tags.contains("engine"));
/// ```
pub fn classify(description: &str, group_id: &str) -> BTreeSet<&'static str> {
    COMPILED
        .iter()
        .filter(|rule| {
            rule.pattern.is_match(description)
                || (rule.category == TagCategory::System && rule.pattern.is_match(group_id))
        })
        .map(|rule| rule.id)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagReport {
    pub tags: usize,
    pub parts_scanned: usize,
    pub assignments: usize,
    /// Parts per tag id, only for tags with at least one part
    pub per_tag: BTreeMap<&'static str, usize>,
}

impl TagReport {
    /// Tag ids ordered by descending part count
    pub fn most_common(&self, limit: usize) -> Vec<(&'static str, usize)> {
        let mut counts: Vec<(&'static str, usize)> =
            self.per_tag.iter().map(|(id, count)| (*id, *count)).collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        counts.truncate(limit);
        counts
    }
}

/// Wipes both tag tables and rebuilds them from the stored parts
pub fn regenerate_tags(storage: &mut SqliteStorage) -> crate::Result<TagReport> {
    let tx = storage.conn_mut().transaction()?;
    tx.execute("DELETE FROM tags_to_parts", [])?;
    tx.execute("DELETE FROM tags", [])?;

    let mut report = TagReport::default();
    {
        let mut insert_tag =
            tx.prepare("INSERT INTO tags (id, name, category) VALUES (?1, ?2, ?3)")?;
        for tag in tag_definitions() {
            insert_tag.execute(params![tag.id, tag.name, tag.category.as_str()])?;
            report.tags += 1;
        }

        let parts: Vec<(i64, Option<String>, String)> = {
            let mut stmt = tx.prepare("SELECT id, description, group_id FROM parts ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut assign =
            tx.prepare("INSERT OR IGNORE INTO tags_to_parts (tag_id, part_id) VALUES (?1, ?2)")?;
        for (part_id, description, group_id) in parts {
            report.parts_scanned += 1;
            for tag in classify(description.as_deref().unwrap_or(""), &group_id) {
                report.assignments += assign.execute(params![tag, part_id])?;
                *report.per_tag.entry(tag).or_default() += 1;
            }
        }
    }
    tx.commit()?;

    tracing::info!(
        "Generated {} tags with {} assignments over {} parts",
        report.tags,
        report.assignments,
        report.parts_scanned
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::test_support::*;
    use crate::storage::Storage;

    #[test]
    fn test_every_rule_compiles() {
        assert_eq!(COMPILED.len(), RULES.len());
    }

    #[test]
    fn test_classify_description() {
        let tags = classify("BEARING, FRONT WHEEL HUB,LH", "axle");
        for expected in ["bearing", "wear-part", "front", "left", "wheels-tires", "drivetrain"] {
            assert!(tags.contains(expected), "missing {expected} in {tags:?}");
        }
        assert!(!tags.contains("right"));
    }

    #[test]
    fn test_system_rules_match_group_id() {
        let tags = classify("", "automatic-transmission");
        assert!(tags.contains("transmission"));

        // Component rules only look at the description
        let tags = classify("", "filter");
        assert!(!tags.contains("filter"));
    }

    #[test]
    fn test_word_boundaries() {
        assert!(classify("NUT, LOCK", "").contains("fastener"));
        assert!(!classify("NUTATION", "").contains("fastener"));
        assert!(classify("SEAL, OIL", "").contains("seal"));
        assert!(!classify("SEALANT", "").contains("seal"));
    }

    #[test]
    fn test_definitions_have_display_names() {
        let defs = tag_definitions();
        let fuel = defs.iter().find(|d| d.id == "fuel-system").unwrap();
        assert_eq!(fuel.name, "Fuel System");
        assert_eq!(fuel.category, TagCategory::System);
    }

    #[test]
    fn test_regenerate_is_repeatable() {
        let mut storage = storage();
        add_diagram(&mut storage, "d1", None);
        add_part(&mut storage, "d1", "MD1", Some("11010"));

        let first = regenerate_tags(&mut storage).unwrap();
        assert_eq!(first.tags, RULES.len());
        assert_eq!(first.parts_scanned, 1);
        // "engine" from the group id
        assert_eq!(first.per_tag.get("engine"), Some(&1));

        let second = regenerate_tags(&mut storage).unwrap();
        assert_eq!(first, second);

        let rows = storage
            .execute_query("SELECT COUNT(*) FROM tags_to_parts")
            .unwrap();
        assert_eq!(
            rows.rows[0][0],
            rusqlite::types::Value::Integer(first.assignments as i64)
        );
    }

    #[test]
    fn test_most_common_orders_by_count() {
        let mut report = TagReport::default();
        report.per_tag.insert("seal", 2);
        report.per_tag.insert("gasket", 5);
        report.per_tag.insert("bearing", 2);
        assert_eq!(
            report.most_common(2),
            vec![("gasket", 5), ("bearing", 2)]
        );
    }
}
