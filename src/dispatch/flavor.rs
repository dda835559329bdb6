//! # Flavors and the classifier seam.

use std::fmt;

/// Shape of an update, used as the routing-table key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flavor {
    /// A message in a chat (text, media, service message, ...).
    Chat,
    /// A button press on an inline keyboard.
    CallbackQuery,
    /// An inline query typed in the input field.
    InlineQuery,
    /// The inline result a user picked.
    ChosenInlineResult,
    /// A shipping address request.
    ShippingQuery,
    /// The final confirmation before a payment.
    PreCheckoutQuery,
    /// A poll state change.
    Poll,
}

impl Flavor {
    /// Every flavor, in declaration order.
    pub const ALL: [Flavor; 7] = [
        Flavor::Chat,
        Flavor::CallbackQuery,
        Flavor::InlineQuery,
        Flavor::ChosenInlineResult,
        Flavor::ShippingQuery,
        Flavor::PreCheckoutQuery,
        Flavor::Poll,
    ];

    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Flavor::Chat => "chat",
            Flavor::CallbackQuery => "callback_query",
            Flavor::InlineQuery => "inline_query",
            Flavor::ChosenInlineResult => "chosen_inline_result",
            Flavor::ShippingQuery => "shipping_query",
            Flavor::PreCheckoutQuery => "pre_checkout_query",
            Flavor::Poll => "poll",
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure, total mapping from an update to its [`Flavor`].
///
/// Implemented for every `Fn(&U) -> Flavor`.
pub trait Classify<U>: Send + Sync + 'static {
    /// Classifies `update`.
    fn classify(&self, update: &U) -> Flavor;
}

impl<U, F> Classify<U> for F
where
    F: Fn(&U) -> Flavor + Send + Sync + 'static,
{
    fn classify(&self, update: &U) -> Flavor {
        self(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_snake_case() {
        let names: Vec<_> = Flavor::ALL.iter().map(Flavor::to_string).collect();
        assert_eq!(names[1], "callback_query");
        assert_eq!(names[5], "pre_checkout_query");
        assert!(names.iter().all(|n| n.chars().all(|c| c.is_ascii_lowercase() || c == '_')));
    }
}
