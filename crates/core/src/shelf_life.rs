//! Static shelf-life fact base: category -> (days to expiry, storage type).
//!
//! Immutable at runtime. The dynamic food database is an override layer on
//! top of this table; see `food_db` for the precedence rules.

use shelfwise_shared::StorageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShelfLifeEntry {
    pub category: &'static str,
    pub days_to_expiry: i64,
    pub storage: StorageType,
}

const TABLE: &[ShelfLifeEntry] = &[
    entry("yogurt", 14, StorageType::Refrigerated),
    entry("cheese", 21, StorageType::Refrigerated),
    entry("milk", 7, StorageType::Refrigerated),
    entry("eggs", 28, StorageType::Refrigerated),
    entry("fish", 2, StorageType::Refrigerated),
    entry("chicken", 2, StorageType::Refrigerated),
    entry("meat", 3, StorageType::Refrigerated),
    entry("bread", 5, StorageType::RoomTemperature),
    entry("nuts", 90, StorageType::RoomTemperature),
    entry("fruit", 7, StorageType::RoomTemperature),
    entry("vegetable", 7, StorageType::Refrigerated),
    entry("frozen", 180, StorageType::Frozen),
    entry("canned", 365, StorageType::RoomTemperature),
    entry("pasta", 365, StorageType::RoomTemperature),
    entry("snacks", 120, StorageType::RoomTemperature),
    entry("beverages", 180, StorageType::RoomTemperature),
    entry("default", 7, StorageType::Refrigerated),
];

const fn entry(category: &'static str, days: i64, storage: StorageType) -> ShelfLifeEntry {
    ShelfLifeEntry {
        category,
        days_to_expiry: days,
        storage,
    }
}

/// Look up a category. Returns `None` for unknown categories; callers fall
/// back to [`default_entry`].
pub fn lookup(category: &str) -> Option<&'static ShelfLifeEntry> {
    TABLE.iter().find(|e| e.category == category)
}

/// The fallback entry: 7 days, refrigerated.
pub fn default_entry() -> &'static ShelfLifeEntry {
    // The "default" row is a fixed member of the table.
    lookup("default").unwrap_or(&TABLE[0])
}

/// All known category names, used as candidate labels for the AI classifier.
pub fn categories() -> impl Iterator<Item = &'static str> {
    TABLE.iter().map(|e| e.category)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Regression: a negative or zero days value would let a predicted
    // expiry precede the purchase date.
    #[test]
    fn no_entry_has_negative_days() {
        for entry in TABLE {
            assert!(
                entry.days_to_expiry > 0,
                "{} has non-positive shelf life",
                entry.category
            );
        }
    }

    #[test]
    fn default_entry_is_seven_days_refrigerated() {
        let entry = default_entry();
        assert_eq!(entry.days_to_expiry, 7);
        assert_eq!(entry.storage, StorageType::Refrigerated);
    }

    #[test]
    fn lookup_known_and_unknown() {
        assert_eq!(lookup("yogurt").map(|e| e.days_to_expiry), Some(14));
        assert!(lookup("spaceship").is_none());
    }

    #[test]
    fn categories_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for category in categories() {
            assert!(seen.insert(category), "duplicate category {category}");
        }
    }
}
