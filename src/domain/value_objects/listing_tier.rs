//! Paid visibility tiers for projects and service listings.

string_enum! {
    /// Visibility tier. Purely a display and sorting concern.
    pub enum ListingTier {
        Standard => "standard",
        Featured => "featured",
        Premium => "premium",
        Spotlight => "spotlight",
    }
}

impl ListingTier {
    /// Sort rank used by browse queries; higher ranks are listed first.
    ///
    /// Mirrors the `tier_rank` SQL expression in the repositories.
    pub fn rank(&self) -> i32 {
        match self {
            ListingTier::Standard => 0,
            ListingTier::Featured => 1,
            ListingTier::Premium => 2,
            ListingTier::Spotlight => 3,
        }
    }

    pub fn is_promoted(&self) -> bool {
        !matches!(self, ListingTier::Standard)
    }
}

impl Default for ListingTier {
    fn default() -> Self {
        ListingTier::Standard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_order() {
        let mut tiers = ListingTier::ALL.to_vec();
        tiers.sort_by_key(|t| std::cmp::Reverse(t.rank()));
        assert_eq!(
            tiers,
            vec![
                ListingTier::Spotlight,
                ListingTier::Premium,
                ListingTier::Featured,
                ListingTier::Standard
            ]
        );
    }

    #[test]
    fn test_json_names() {
        assert_eq!(
            serde_json::to_string(&ListingTier::Spotlight).unwrap(),
            "\"SPOTLIGHT\""
        );
        assert_eq!(ListingTier::parse("featured"), Some(ListingTier::Featured));
        assert_eq!(ListingTier::parse("FEATURED"), None);
    }
}
