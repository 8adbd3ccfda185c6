//! Static unit tables.
//!
//! Every category lists its standard unit first. A unit's `scale`/`offset`
//! map it onto the standard unit: `standard = value * scale + offset`.

use std::collections::HashMap;

use super::MeasurementCategory;

/// One unit within a category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitDef {
    pub unit: &'static str,
    pub scale: f64,
    pub offset: f64,
}

const fn linear(unit: &'static str, scale: f64) -> UnitDef {
    UnitDef {
        unit,
        scale,
        offset: 0.0,
    }
}

const fn affine(unit: &'static str, scale: f64, offset: f64) -> UnitDef {
    UnitDef { unit, scale, offset }
}

pub(super) const MASS: &[UnitDef] = &[
    linear("kg", 1.0),
    linear("g", 0.001),
    linear("mg", 1e-6),
    linear("lb", 0.45359237),
    linear("oz", 0.028349523125),
];

pub(super) const LENGTH: &[UnitDef] = &[
    linear("m", 1.0),
    linear("cm", 0.01),
    linear("mm", 0.001),
    linear("ft", 0.3048),
    linear("in", 0.0254),
];

pub(super) const VOLUME: &[UnitDef] = &[
    linear("L", 1.0),
    linear("mL", 0.001),
    linear("dL", 0.1),
    linear("gal", 3.785411784),
    linear("fl_oz", 0.0295735295625),
];

pub(super) const TIME: &[UnitDef] = &[
    linear("s", 1.0),
    linear("min", 60.0),
    linear("h", 3600.0),
    linear("day", 86_400.0),
    linear("week", 604_800.0),
    linear("month", 2_629_800.0),
    linear("year", 31_557_600.0),
];

pub(super) const AGE: &[UnitDef] = &[
    linear("year", 1.0),
    linear("month", 1.0 / 12.0),
    linear("week", 7.0 / 365.25),
    linear("day", 1.0 / 365.25),
];

pub(super) const TEMPERATURE: &[UnitDef] = &[
    linear("degC", 1.0),
    affine("degF", 5.0 / 9.0, -160.0 / 9.0),
    affine("K", 1.0, -273.15),
];

pub(super) const PRESSURE: &[UnitDef] = &[
    linear("mmHg", 1.0),
    linear("kPa", 7.500615758),
    linear("atm", 760.0),
    linear("psi", 51.71493257),
];

pub(super) const CONCENTRATION: &[UnitDef] = &[
    linear("mg/dL", 1.0),
    linear("g/L", 100.0),
    linear("mg/L", 0.1),
];

pub(super) const GLUCOSE: &[UnitDef] = &[linear("mg/dL", 1.0), linear("mmol/L", 18.016)];

pub(super) const CREATININE: &[UnitDef] = &[
    linear("mg/dL", 1.0),
    linear("umol/L", 1.0 / 88.42),
    linear("mmol/L", 1000.0 / 88.42),
];

pub(super) const CHOLESTEROL: &[UnitDef] = &[linear("mg/dL", 1.0), linear("mmol/L", 38.67)];

pub(super) const HEMOGLOBIN: &[UnitDef] = &[
    linear("g/dL", 1.0),
    linear("g/L", 0.1),
    linear("mmol/L", 1.0 / 0.6206),
];

pub(super) const HEART_RATE: &[UnitDef] = &[linear("bpm", 1.0), linear("/min", 1.0)];

pub(super) const RESPIRATORY_RATE: &[UnitDef] = &[linear("/min", 1.0), linear("/s", 60.0)];

pub(super) const AREA: &[UnitDef] = &[
    linear("m2", 1.0),
    linear("cm2", 1e-4),
    linear("ft2", 0.09290304),
];

pub(super) const GFR: &[UnitDef] = &[
    linear("mL/min/1.73m2", 1.0),
    linear("mL/s/1.73m2", 60.0),
];

pub(super) const BILIRUBIN: &[UnitDef] = &[linear("mg/dL", 1.0), linear("umol/L", 1.0 / 17.104)];

pub(super) const SODIUM: &[UnitDef] = &[linear("mEq/L", 1.0), linear("mmol/L", 1.0)];

pub(super) const CALCIUM: &[UnitDef] = &[linear("mg/dL", 1.0), linear("mmol/L", 4.008)];

pub(super) const ALBUMIN: &[UnitDef] = &[linear("g/dL", 1.0), linear("g/L", 0.1)];

pub(super) const UREA: &[UnitDef] = &[linear("mg/dL", 1.0), linear("mmol/L", 2.801)];

/// Units as written by clinicians → canonical spelling. Keys are lowercase.
pub(super) fn default_aliases() -> HashMap<String, String> {
    let mut map = HashMap::new();

    // Every canonical unit is its own alias
    for category in MeasurementCategory::ALL {
        for def in category.units() {
            map.insert(def.unit.to_lowercase(), def.unit.to_string());
        }
    }

    let pairs: &[(&str, &str)] = &[
        // Mass
        ("kgs", "kg"),
        ("kilo", "kg"),
        ("kilos", "kg"),
        ("kilogram", "kg"),
        ("kilograms", "kg"),
        ("quilos", "kg"),
        ("gram", "g"),
        ("grams", "g"),
        ("gr", "g"),
        ("milligram", "mg"),
        ("milligrams", "mg"),
        ("lbs", "lb"),
        ("pound", "lb"),
        ("pounds", "lb"),
        ("ounce", "oz"),
        ("ounces", "oz"),
        // Length
        ("meter", "m"),
        ("meters", "m"),
        ("metre", "m"),
        ("metros", "m"),
        ("centimeter", "cm"),
        ("centimeters", "cm"),
        ("centimetros", "cm"),
        ("millimeter", "mm"),
        ("millimeters", "mm"),
        ("feet", "ft"),
        ("foot", "ft"),
        ("inch", "in"),
        ("inches", "in"),
        // Volume
        ("l", "L"),
        ("liter", "L"),
        ("liters", "L"),
        ("litre", "L"),
        ("litros", "L"),
        ("milliliter", "mL"),
        ("milliliters", "mL"),
        ("cc", "mL"),
        ("deciliter", "dL"),
        ("gallon", "gal"),
        ("gallons", "gal"),
        ("floz", "fl_oz"),
        ("fl oz", "fl_oz"),
        // Time
        ("sec", "s"),
        ("secs", "s"),
        ("second", "s"),
        ("seconds", "s"),
        ("mins", "min"),
        ("minute", "min"),
        ("minutes", "min"),
        ("minutos", "min"),
        ("hr", "h"),
        ("hrs", "h"),
        ("hour", "h"),
        ("hours", "h"),
        ("horas", "h"),
        ("d", "day"),
        ("days", "day"),
        ("dias", "day"),
        ("días", "day"),
        ("wk", "week"),
        ("weeks", "week"),
        ("semanas", "week"),
        ("mo", "month"),
        ("months", "month"),
        ("meses", "month"),
        ("y", "year"),
        ("yr", "year"),
        ("yrs", "year"),
        ("years", "year"),
        ("yo", "year"),
        ("anos", "year"),
        ("años", "year"),
        // Temperature
        ("°c", "degC"),
        ("ºc", "degC"),
        ("c", "degC"),
        ("celsius", "degC"),
        ("°f", "degF"),
        ("ºf", "degF"),
        ("f", "degF"),
        ("fahrenheit", "degF"),
        ("kelvin", "K"),
        // Pressure
        ("mm hg", "mmHg"),
        ("torr", "mmHg"),
        // Concentration
        ("µmol/l", "umol/L"),
        ("μmol/l", "umol/L"),
        ("micromol/l", "umol/L"),
        ("meq/l", "mEq/L"),
        ("mmol/l", "mmol/L"),
        // Rates
        ("beats/min", "bpm"),
        ("beats per minute", "bpm"),
        ("breaths/min", "/min"),
        ("rpm", "/min"),
        ("min-1", "/min"),
        ("1/min", "/min"),
        ("1/s", "/s"),
        // Area
        ("m²", "m2"),
        ("m**2", "m2"),
        ("m^2", "m2"),
        ("cm²", "cm2"),
        ("cm**2", "cm2"),
        ("ft²", "ft2"),
        ("ft**2", "ft2"),
        // GFR
        ("ml/min/1.73m²", "mL/min/1.73m2"),
        ("ml/min/1.73m**2", "mL/min/1.73m2"),
        ("ml/min/1.73m^2", "mL/min/1.73m2"),
    ];

    for (alias, canonical) in pairs {
        map.insert(alias.to_string(), canonical.to_string());
    }

    map
}
