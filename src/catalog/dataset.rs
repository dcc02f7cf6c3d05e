//! Built-in category dataset
//!
//! A fixed three-level slice of a marketplace taxonomy. Level-3 entries are
//! the only ones valid for market analysis; aliases carry the colloquial
//! names buyers actually type.

use super::CatalogEntry;

fn entry(id: u32, name: &str, level: u8, parent_id: Option<u32>, aliases: &[&str]) -> CatalogEntry {
    CatalogEntry {
        id,
        name: name.to_string(),
        level,
        parent_id,
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
    }
}

/// The default taxonomy entries, root categories first.
pub(crate) fn builtin_entries() -> Vec<CatalogEntry> {
    vec![
        // Level 1
        entry(1, "Women", 1, None, &[]),
        entry(2, "Men", 1, None, &[]),
        entry(3, "Electronics", 1, None, &["tech"]),
        entry(4, "Bags & Accessories", 1, None, &[]),
        // Level 2
        entry(11, "Women Clothing", 2, Some(1), &["womenswear"]),
        entry(12, "Women Shoes", 2, Some(1), &[]),
        entry(21, "Men Clothing", 2, Some(2), &["menswear"]),
        entry(22, "Men Shoes", 2, Some(2), &[]),
        entry(31, "Phones & Tablets", 2, Some(3), &["mobile"]),
        entry(32, "Audio", 2, Some(3), &["sound"]),
        entry(41, "Bags", 2, Some(4), &[]),
        entry(42, "Accessories", 2, Some(4), &[]),
        // Level 3
        entry(111, "Dresses", 3, Some(11), &["dress", "gown", "robe"]),
        entry(112, "Tops & T-shirts", 3, Some(11), &["top", "tee", "t-shirt", "blouse"]),
        entry(113, "Jeans", 3, Some(11), &["denim"]),
        entry(121, "Sneakers", 3, Some(12), &["sneaker", "trainers", "kicks"]),
        entry(122, "Heels", 3, Some(12), &["pumps", "stilettos"]),
        entry(123, "Boots", 3, Some(12), &["booties", "ankle"]),
        entry(211, "T-shirts", 3, Some(21), &["tee", "t-shirt"]),
        entry(212, "Hoodies & Sweatshirts", 3, Some(21), &["hoodie", "sweatshirt", "jumper"]),
        entry(213, "Coats & Jackets", 3, Some(21), &["coat", "jacket", "parka"]),
        entry(221, "Sneakers", 3, Some(22), &["sneaker", "trainers", "kicks"]),
        entry(222, "Formal Shoes", 3, Some(22), &["oxford", "derby", "loafers"]),
        entry(311, "Smartphones", 3, Some(31), &["smartphone", "phone", "iphone", "android"]),
        entry(312, "Tablets", 3, Some(31), &["tablet", "ipad"]),
        entry(321, "Headphones", 3, Some(32), &["headset", "earbuds", "airpods"]),
        entry(322, "Speakers", 3, Some(32), &["speaker", "soundbar"]),
        entry(411, "Handbags", 3, Some(41), &["handbag", "purse", "tote", "neverfull"]),
        entry(412, "Backpacks", 3, Some(41), &["backpack", "rucksack"]),
        entry(421, "Watches", 3, Some(42), &["watch", "chronograph"]),
        entry(422, "Sunglasses", 3, Some(42), &["shades", "aviators"]),
    ]
}

/// High-traffic level-3 ids surfaced by smart search.
pub(crate) const POPULAR_CATEGORY_IDS: [u32; 5] = [121, 221, 311, 111, 411];
