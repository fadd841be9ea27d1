use std::collections::HashMap;
use std::sync::LazyLock;

use tracing::debug;

/// Minimum name length for ASCII names (avoids short ambiguous names).
pub const MIN_NAME_LENGTH_ASCII: usize = 3;
/// Non-ASCII names carry more meaning per character (CJK, Cyrillic).
pub const MIN_NAME_LENGTH_NON_ASCII: usize = 2;

const CITIES_TSV: &str = include_str!("../data/cities.tsv");

/// One row of the embedded city dataset.
#[derive(Debug, Clone)]
pub struct CityRecord {
    pub name: String,
    pub timezone: String,
    pub population: u64,
    pub alternate_names: Vec<String>,
}

/// Preloaded lookup structures over the dataset.
///
/// `exact`: lowercased name or alternate → best (highest-population) record
/// index, no length filtering — used by `geocode_city`.
/// `in_text`: same mapping filtered to the minimum name lengths — used by the
/// in-text finder, where short keys would produce false positives.
pub struct CityTable {
    records: Vec<CityRecord>,
    exact: HashMap<String, usize>,
    in_text: HashMap<String, usize>,
}

impl CityTable {
    fn build() -> Self {
        let mut records = Vec::new();
        for line in CITIES_TSV.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split('\t');
            let (Some(name), Some(tz), Some(pop)) = (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            let population: u64 = pop.trim().parse().unwrap_or(0);
            let alternate_names = parts
                .next()
                .map(|alts| {
                    alts.split(',')
                        .map(|a| a.trim().to_string())
                        .filter(|a| !a.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            records.push(CityRecord {
                name: name.trim().to_string(),
                timezone: tz.trim().to_string(),
                population,
                alternate_names,
            });
        }

        let mut exact: HashMap<String, usize> = HashMap::new();
        let mut in_text: HashMap<String, usize> = HashMap::new();
        for (idx, rec) in records.iter().enumerate() {
            let mut names = vec![rec.name.to_lowercase()];
            names.extend(rec.alternate_names.iter().map(|a| a.to_lowercase()));
            for key in names {
                add_name(&mut exact, &records, key.clone(), idx);
                if valid_in_text_length(&key) {
                    add_name(&mut in_text, &records, key, idx);
                }
            }
        }

        debug!(
            records = records.len(),
            names = exact.len(),
            "city table initialized"
        );
        Self {
            records,
            exact,
            in_text,
        }
    }

    /// Case-insensitive exact lookup; ties go to the higher population.
    pub fn lookup_exact(&self, name: &str) -> Option<&CityRecord> {
        self.exact
            .get(&name.to_lowercase())
            .map(|&idx| &self.records[idx])
    }

    /// Lookup for the in-text finder (length-filtered key set).
    pub fn lookup_in_text(&self, name: &str) -> Option<&CityRecord> {
        self.in_text
            .get(&name.to_lowercase())
            .map(|&idx| &self.records[idx])
    }
}

/// Keep the highest-population record for a colliding name.
fn add_name(map: &mut HashMap<String, usize>, records: &[CityRecord], key: String, idx: usize) {
    match map.get(&key) {
        Some(&existing) if records[existing].population >= records[idx].population => {}
        _ => {
            map.insert(key, idx);
        }
    }
}

fn valid_in_text_length(name: &str) -> bool {
    if name.is_ascii() {
        name.len() >= MIN_NAME_LENGTH_ASCII
    } else {
        name.chars().count() >= MIN_NAME_LENGTH_NON_ASCII
    }
}

static TABLE: LazyLock<CityTable> = LazyLock::new(CityTable::build);

/// Shared lazily-built city table.
pub fn city_table() -> &'static CityTable {
    &TABLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_loads_embedded_dataset() {
        let table = city_table();
        assert!(table.records.len() > 100);
    }

    #[test]
    fn collision_keeps_highest_population() {
        let rec = city_table().lookup_exact("london").unwrap();
        assert_eq!(rec.timezone, "Europe/London");
        assert!(rec.population > 1_000_000);
    }

    #[test]
    fn alternate_names_are_indexed() {
        let rec = city_table().lookup_exact("Пекин").unwrap();
        assert_eq!(rec.name, "Beijing");
    }

    #[test]
    fn in_text_table_drops_short_ascii_keys() {
        // "LA" is a valid exact alternate but too short for in-text matching.
        assert!(city_table().lookup_exact("la").is_some());
        assert!(city_table().lookup_in_text("la").is_none());
    }

    #[test]
    fn in_text_table_keeps_two_char_cjk() {
        assert!(city_table().lookup_in_text("東京").is_some());
    }
}
