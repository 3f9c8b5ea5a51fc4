use std::collections::HashMap;

use crate::intent::Topic;

/// A canned reply plus the follow-ups offered with it
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEntry {
    pub text: String,
    /// Never `Some(vec![])`; see [`ResponseEntry::new`]
    pub quick_replies: Option<Vec<String>>,
}

impl ResponseEntry {
    /// Blank labels are dropped and an empty list becomes `None`.
    pub fn new(text: &str, quick_replies: &[&str]) -> Self {
        let labels: Vec<String> = quick_replies
            .iter()
            .map(|label| label.trim())
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            text: text.to_string(),
            quick_replies: if labels.is_empty() { None } else { Some(labels) },
        }
    }
}

/// Immutable topic → reply mapping, total over [`Topic`]
#[derive(Debug, Clone)]
pub struct ResponseTable {
    entries: HashMap<Topic, ResponseEntry>,
}

impl ResponseTable {
    pub fn builtin() -> Self {
        let mut entries = HashMap::new();

        entries.insert(
            Topic::RentalPlans,
            ResponseEntry::new(
                "**Rental Plans & Pricing** 🛵\n\n\
                 • Daily: ₹199/day, unlimited km\n\
                 • Weekly: ₹1,199/week, includes 7 battery swaps\n\
                 • Monthly: ₹3,999/month, unlimited swaps + free servicing\n\n\
                 All plans include insurance and 24/7 roadside assistance.",
                &["Book Now", "Battery Swap", "Earnings Info"],
            ),
        );

        entries.insert(
            Topic::BatterySwap,
            ResponseEntry::new(
                "**Battery Swap Network** 🔋\n\n\
                 • 150+ swap stations across the city\n\
                 • A swap takes under 2 minutes\n\
                 • Stations are open 24/7\n\n\
                 Open the app map to find the nearest station with charged batteries.",
                &["Rental Plans", "Book Now", "Contact Support"],
            ),
        );

        entries.insert(
            Topic::KycStatus,
            ResponseEntry::new(
                "**KYC Verification** 📄\n\n\
                 You'll need:\n\
                 • Aadhaar card\n\
                 • PAN card\n\
                 • Valid driving licence\n\
                 • A recent selfie\n\n\
                 Verification usually completes within 24 hours of upload.",
                &["Upload Documents", "Contact Support"],
            ),
        );

        entries.insert(
            Topic::EarningsInfo,
            ResponseEntry::new(
                "**Earnings with Our Fleet** 💰\n\n\
                 • Riders earn ₹25,000-₹40,000/month on partner delivery platforms\n\
                 • Low running cost: about ₹0.25/km\n\
                 • Weekly payouts straight to your bank account\n\n\
                 More deliveries per shift thanks to instant battery swaps.",
                &["Rental Plans", "Book Now"],
            ),
        );

        entries.insert(
            Topic::BookNow,
            ResponseEntry::new(
                "**Let's get you riding!** 🚀\n\n\
                 1. Register with your mobile number\n\
                 2. Complete KYC verification\n\
                 3. Pick a rental plan\n\
                 4. Collect your vehicle from the nearest hub\n\n\
                 Most riders are on the road the same day.",
                &["Complete KYC", "Rental Plans"],
            ),
        );

        entries.insert(
            Topic::ContactSupport,
            ResponseEntry::new(
                "**Customer Support** 📞\n\n\
                 • Phone: 1800-123-4567 (24/7)\n\
                 • Email: support@fleetrentals.example\n\
                 • WhatsApp: +91 98765 43210\n\n\
                 You can also raise a ticket from the app's Help section.",
                &["Rental Plans", "KYC Status", "Battery Swap"],
            ),
        );

        entries.insert(
            Topic::Default,
            ResponseEntry::new(
                "I'm not sure I understood that. 🤔\n\n\
                 I can help you with:\n\
                 • Rental plans and pricing\n\
                 • Battery swap stations\n\
                 • KYC verification\n\
                 • Earnings as a delivery rider\n\
                 • Booking a vehicle",
                &[
                    "Rental Plans",
                    "Battery Swap",
                    "KYC Status",
                    "Earnings Info",
                    "Contact Support",
                ],
            ),
        );

        Self { entries }
    }

    pub fn respond(&self, topic: Topic) -> &ResponseEntry {
        self.entries
            .get(&topic)
            .unwrap_or_else(|| self.default_entry())
    }

    fn default_entry(&self) -> &ResponseEntry {
        &self.entries[&Topic::Default]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
