//! Rotorcraft classification.
//!
//! Four evidence tiers are tried strongest first and the first positive one
//! wins: emitter category, operator label, type description or designator,
//! then a permissive kinematic envelope. Which tiers run is decided by a
//! [`ClassifierPolicy`] owned by the upstream adapter, since providers differ in
//! which fields they expose.

/// ADS-B emitter category for rotorcraft.
pub const ROTORCRAFT_CATEGORY: &str = "A7";

/// Kinematic envelope: strictly below these limits (or unknown) counts as positive.
pub const KINEMATIC_MAX_ALTITUDE_FT: i32 = 9000;
pub const KINEMATIC_MAX_SPEED_KT: i32 = 160;

/// Operator fragments for police air support and air ambulance services.
const OPERATOR_KEYWORDS: &[&str] = &[
    "police",
    "sheriff",
    "constabulary",
    "air support",
    "highway patrol",
    "air ambulance",
    "ambulance",
    "medevac",
    "life flight",
    "lifeflight",
    "air methods",
    "careflight",
    "stars air",
    "hems",
    "air rescue",
    "search and rescue",
];

/// Manufacturer and model fragments found in free-text type descriptions.
const DESCRIPTION_KEYWORDS: &[&str] = &[
    "helicopter",
    "rotorcraft",
    "robinson",
    "sikorsky",
    "eurocopter",
    "airbus helicopters",
    "agusta",
    "leonardo aw",
    "md helicopters",
    "hughes 369",
    "schweizer",
    "enstrom",
    "kaman",
    "bell 206",
    "bell 407",
    "bell 412",
    "bell 429",
    "bell 505",
    "jetranger",
    "longranger",
    "black hawk",
    "chinook",
];

/// ICAO type designators of common rotorcraft.
const TYPE_CODES: &[&str] = &[
    "R22", "R44", "R66", "B06", "B06T", "B47G", "B204", "B205", "B212", "B222", "B230", "B407",
    "B412", "B427", "B429", "B430", "B505", "AS32", "AS50", "AS55", "AS65", "EC20", "EC25",
    "EC30", "EC35", "EC45", "EC55", "EC75", "H160", "BK17", "A109", "A119", "A139", "A149",
    "A169", "A189", "AW09", "S61", "S70", "S76", "S92", "H47", "H60", "UH1", "MD52", "MD60",
    "H500", "EN28", "EN48", "S300", "K126", "KMAX", "GAZL", "ALO3", "LYNX", "NH90", "MI8",
];

/// Which evidence tiers a provider's records are judged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierPolicy {
    pub category: bool,
    pub operator: bool,
    pub type_description: bool,
    pub kinematic: bool,
}

impl ClassifierPolicy {
    /// Category evidence only; anything else is negative.
    pub const fn strict() -> Self {
        Self {
            category: true,
            operator: false,
            type_description: false,
            kinematic: false,
        }
    }

    /// All four tiers, ending with the kinematic fallback.
    pub const fn full() -> Self {
        Self {
            category: true,
            operator: true,
            type_description: true,
            kinematic: true,
        }
    }
}

/// Fields a provider may or may not report for one aircraft.
#[derive(Debug, Clone, Copy, Default)]
pub struct AircraftEvidence<'a> {
    /// Emitter category code (`A0`..`C7`)
    pub category: Option<&'a str>,
    pub operator: Option<&'a str>,
    pub type_description: Option<&'a str>,
    /// ICAO type designator
    pub type_code: Option<&'a str>,
    pub altitude_feet: Option<i32>,
    pub ground_speed_knots: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceTier {
    Category,
    Operator,
    TypeDescription,
    Kinematic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub likely_rotorcraft: bool,
    /// Tier that produced the positive result, `None` when negative
    pub tier: Option<EvidenceTier>,
}

impl Classification {
    fn positive(tier: EvidenceTier) -> Self {
        Self {
            likely_rotorcraft: true,
            tier: Some(tier),
        }
    }

    fn negative() -> Self {
        Self {
            likely_rotorcraft: false,
            tier: None,
        }
    }
}

pub fn classify(evidence: &AircraftEvidence<'_>, policy: &ClassifierPolicy) -> Classification {
    if policy.category && evidence.category.is_some_and(category_is_rotorcraft) {
        return Classification::positive(EvidenceTier::Category);
    }

    if policy.operator && evidence.operator.is_some_and(operator_is_rotorcraft) {
        return Classification::positive(EvidenceTier::Operator);
    }

    if policy.type_description
        && (evidence.type_description.is_some_and(description_is_rotorcraft)
            || evidence.type_code.is_some_and(type_code_is_rotorcraft))
    {
        return Classification::positive(EvidenceTier::TypeDescription);
    }

    if policy.kinematic
        && within_kinematic_envelope(evidence.altitude_feet, evidence.ground_speed_knots)
    {
        return Classification::positive(EvidenceTier::Kinematic);
    }

    Classification::negative()
}

pub fn category_is_rotorcraft(category: &str) -> bool {
    let category = category.trim();
    category.eq_ignore_ascii_case(ROTORCRAFT_CATEGORY)
        || category.eq_ignore_ascii_case("rotorcraft")
        || category.eq_ignore_ascii_case("helicopter")
}

fn operator_is_rotorcraft(operator: &str) -> bool {
    contains_any(operator, OPERATOR_KEYWORDS)
}

fn description_is_rotorcraft(description: &str) -> bool {
    contains_any(description, DESCRIPTION_KEYWORDS)
}

fn type_code_is_rotorcraft(code: &str) -> bool {
    let code = code.trim();
    TYPE_CODES.iter().any(|known| code.eq_ignore_ascii_case(known))
}

/// Unknown altitude or speed does not disqualify.
fn within_kinematic_envelope(altitude_feet: Option<i32>, ground_speed_knots: Option<i32>) -> bool {
    let low = altitude_feet.map_or(true, |alt| alt < KINEMATIC_MAX_ALTITUDE_FT);
    let slow = ground_speed_knots.map_or(true, |gs| gs < KINEMATIC_MAX_SPEED_KT);
    low && slow
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let haystack = haystack.to_lowercase();
    needles.iter().any(|needle| haystack.contains(needle))
}
