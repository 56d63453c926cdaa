//! Display labels for the app's category and space keys.
//!
//! Unknown categories collapse to [`OTHER_CATEGORY_LABEL`]; unknown spaces are
//! echoed back as-is. The asymmetry is intentional: spaces may be user-defined,
//! categories are not.

pub const OTHER_CATEGORY_LABEL: &str = "Other";

pub const CATEGORY_KEYS: &[&str] = &[
    "clothing",
    "books",
    "kitchen",
    "electronics",
    "decor",
    "toys",
    "papers",
    "sentimental",
    "bathroom",
    "tools",
    "sports",
    "other",
];

pub const SPACE_KEYS: &[&str] = &[
    "bedroom",
    "closet",
    "kitchen",
    "living_room",
    "bathroom",
    "office",
    "garage",
    "kids_room",
    "entryway",
    "storage",
];

pub fn resolve_category_label(key: &str) -> &str {
    match key {
        "clothing" => "Clothing",
        "books" => "Books & Media",
        "kitchen" => "Kitchenware",
        "electronics" => "Electronics",
        "decor" => "Decor",
        "toys" => "Toys & Games",
        "papers" => "Papers & Documents",
        "sentimental" => "Sentimental Items",
        "bathroom" => "Bathroom & Beauty",
        "tools" => "Tools & Hardware",
        "sports" => "Sports & Outdoors",
        _ => OTHER_CATEGORY_LABEL,
    }
}

pub fn resolve_space_label(key: &str) -> &str {
    match key {
        "bedroom" => "Bedroom",
        "closet" => "Closet",
        "kitchen" => "Kitchen",
        "living_room" => "Living Room",
        "bathroom" => "Bathroom",
        "office" => "Home Office",
        "garage" => "Garage",
        "kids_room" => "Kids' Room",
        "entryway" => "Entryway",
        "storage" => "Storage",
        other => other,
    }
}
