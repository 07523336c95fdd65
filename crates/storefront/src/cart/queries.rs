//! GraphQL documents for the cart.
//!
//! Every mutation selects the cart through the `CartApiMutation` fragment and
//! every query through `CartApiQuery`. Callers can pass their own fragment
//! with the same name to change what comes back. The operation is always the
//! first definition in the document.

/// Cart fields returned by [`cart_get`] unless overridden.
pub const DEFAULT_CART_QUERY_FRAGMENT: &str = r"
fragment CartApiQuery on Cart {
  id
  checkoutUrl
  totalQuantity
  note
  updatedAt
  attributes { key value }
  buyerIdentity { countryCode email phone }
  cost {
    subtotalAmount { amount currencyCode }
    totalAmount { amount currencyCode }
    totalTaxAmount { amount currencyCode }
    totalDutyAmount { amount currencyCode }
  }
  discountCodes { code applicable }
  appliedGiftCards { id lastCharacters amountUsed { amount currencyCode } }
  lines(first: $numCartLines) {
    nodes {
      id
      quantity
      attributes { key value }
      cost {
        amountPerQuantity { amount currencyCode }
        compareAtAmountPerQuantity { amount currencyCode }
        totalAmount { amount currencyCode }
      }
      merchandise {
        ... on ProductVariant { id title availableForSale requiresShipping }
      }
    }
  }
}
";

/// Cart fields returned by every mutation unless overridden.
pub const DEFAULT_CART_MUTATE_FRAGMENT: &str = r"
fragment CartApiMutation on Cart {
  id
  totalQuantity
  checkoutUrl
}
";

const USER_ERROR_FRAGMENT: &str = r"
fragment CartApiError on CartUserError {
  message
  field
  code
}
";

const WARNING_FRAGMENT: &str = r"
fragment CartApiWarning on CartWarning {
  message
  code
  target
}
";

const METAFIELDS_ERROR_FRAGMENT: &str = r"
fragment MetafieldError on MetafieldsSetUserError {
  message
  field
  code
}
";

/// `cart(id:)` with `$numCartLines` lines.
#[must_use]
pub fn cart_get(fragment: &str) -> String {
    format!(
        r"
query CartQuery($cartId: ID!, $numCartLines: Int = 100, $country: CountryCode = ZZ, $language: LanguageCode)
  @inContext(country: $country, language: $language) {{
  cart(id: $cartId) {{ ...CartApiQuery }}
}}
{fragment}"
    )
}

/// A cart mutation with the standard `{ cart userErrors warnings }` payload.
fn cart_mutation(name: &str, variables: &str, arguments: &str, fragment: &str) -> String {
    format!(
        r"
mutation {name}({variables}, $country: CountryCode = ZZ, $language: LanguageCode)
  @inContext(country: $country, language: $language) {{
  {name}({arguments}) {{
    cart {{ ...CartApiMutation }}
    userErrors {{ ...CartApiError }}
    warnings {{ ...CartApiWarning }}
  }}
}}
{fragment}
{USER_ERROR_FRAGMENT}
{WARNING_FRAGMENT}"
    )
}

#[must_use]
pub fn cart_create(fragment: &str) -> String {
    cart_mutation("cartCreate", "$input: CartInput!", "input: $input", fragment)
}

#[must_use]
pub fn cart_lines_add(fragment: &str) -> String {
    cart_mutation(
        "cartLinesAdd",
        "$cartId: ID!, $lines: [CartLineInput!]!",
        "cartId: $cartId, lines: $lines",
        fragment,
    )
}

#[must_use]
pub fn cart_lines_update(fragment: &str) -> String {
    cart_mutation(
        "cartLinesUpdate",
        "$cartId: ID!, $lines: [CartLineUpdateInput!]!",
        "cartId: $cartId, lines: $lines",
        fragment,
    )
}

#[must_use]
pub fn cart_lines_remove(fragment: &str) -> String {
    cart_mutation(
        "cartLinesRemove",
        "$cartId: ID!, $lineIds: [ID!]!",
        "cartId: $cartId, lineIds: $lineIds",
        fragment,
    )
}

#[must_use]
pub fn cart_discount_codes_update(fragment: &str) -> String {
    cart_mutation(
        "cartDiscountCodesUpdate",
        "$cartId: ID!, $discountCodes: [String!]",
        "cartId: $cartId, discountCodes: $discountCodes",
        fragment,
    )
}

#[must_use]
pub fn cart_gift_card_codes_update(fragment: &str) -> String {
    cart_mutation(
        "cartGiftCardCodesUpdate",
        "$cartId: ID!, $giftCardCodes: [String!]!",
        "cartId: $cartId, giftCardCodes: $giftCardCodes",
        fragment,
    )
}

#[must_use]
pub fn cart_buyer_identity_update(fragment: &str) -> String {
    cart_mutation(
        "cartBuyerIdentityUpdate",
        "$cartId: ID!, $buyerIdentity: CartBuyerIdentityInput!",
        "cartId: $cartId, buyerIdentity: $buyerIdentity",
        fragment,
    )
}

#[must_use]
pub fn cart_note_update(fragment: &str) -> String {
    cart_mutation(
        "cartNoteUpdate",
        "$cartId: ID!, $note: String!",
        "cartId: $cartId, note: $note",
        fragment,
    )
}

#[must_use]
pub fn cart_selected_delivery_options_update(fragment: &str) -> String {
    cart_mutation(
        "cartSelectedDeliveryOptionsUpdate",
        "$cartId: ID!, $selectedDeliveryOptions: [CartSelectedDeliveryOptionInput!]!",
        "cartId: $cartId, selectedDeliveryOptions: $selectedDeliveryOptions",
        fragment,
    )
}

#[must_use]
pub fn cart_attributes_update(fragment: &str) -> String {
    cart_mutation(
        "cartAttributesUpdate",
        "$cartId: ID!, $attributes: [AttributeInput!]!",
        "cartId: $cartId, attributes: $attributes",
        fragment,
    )
}

#[must_use]
pub fn cart_delivery_addresses_add(fragment: &str) -> String {
    cart_mutation(
        "cartDeliveryAddressesAdd",
        "$cartId: ID!, $addresses: [CartSelectableAddressInput!]!",
        "cartId: $cartId, addresses: $addresses",
        fragment,
    )
}

#[must_use]
pub fn cart_delivery_addresses_update(fragment: &str) -> String {
    cart_mutation(
        "cartDeliveryAddressesUpdate",
        "$cartId: ID!, $addresses: [CartSelectableAddressUpdateInput!]!",
        "cartId: $cartId, addresses: $addresses",
        fragment,
    )
}

#[must_use]
pub fn cart_delivery_addresses_remove(fragment: &str) -> String {
    cart_mutation(
        "cartDeliveryAddressesRemove",
        "$cartId: ID!, $addressIds: [ID!]!",
        "cartId: $cartId, addressIds: $addressIds",
        fragment,
    )
}

/// `cartMetafieldsSet` only returns user errors; the cart is not selectable.
#[must_use]
pub fn cart_metafields_set() -> String {
    format!(
        r"
mutation cartMetafieldsSet($metafields: [CartMetafieldsSetInput!]!, $country: CountryCode = ZZ, $language: LanguageCode)
  @inContext(country: $country, language: $language) {{
  cartMetafieldsSet(metafields: $metafields) {{
    userErrors {{ ...MetafieldError }}
  }}
}}
{METAFIELDS_ERROR_FRAGMENT}"
    )
}

#[must_use]
pub fn cart_metafield_delete() -> String {
    format!(
        r"
mutation cartMetafieldDelete($input: CartMetafieldDeleteInput!) {{
  cartMetafieldDelete(input: $input) {{
    deletedId
    userErrors {{ ...MetafieldError }}
  }}
}}
{METAFIELDS_ERROR_FRAGMENT}"
    )
}
