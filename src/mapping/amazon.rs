//! Amazon SP-API order mapping (Orders v0 field names).
//!
//! Amazon is the odd one out: PascalCase keys, money as
//! `{"CurrencyCode": ..., "Amount": "..."}` with string amounts, and order
//! items delivered by a separate endpoint (the platform client embeds them
//! under `OrderItems` before handing the payload to the mapper).

use serde_json::Value;

use super::canonical::{
    CanonicalOrder, CanonicalProduct, Customer, OrderStatus, OrderLine, PlatformType,
};
use super::fields::{map_address, pick_datetime, pick_f64, pick_i64, pick_str, value_as_f64};
use super::{translate_status, MappingError};

pub(crate) const STATUSES: &[(&str, OrderStatus)] = &[
    ("Pending", OrderStatus::Pending),
    ("PendingAvailability", OrderStatus::Pending),
    ("Unshipped", OrderStatus::Processing),
    ("PartiallyShipped", OrderStatus::Shipped),
    ("Shipped", OrderStatus::Shipped),
    ("InvoiceUnconfirmed", OrderStatus::Shipped),
    ("Delivered", OrderStatus::Delivered),
    ("Canceled", OrderStatus::Cancelled),
    ("Unfulfillable", OrderStatus::Cancelled),
];

fn sp_money(v: Option<&Value>) -> Option<f64> {
    v.and_then(|m| m.get("Amount")).and_then(value_as_f64)
}

pub fn map_order(raw: &Value) -> Result<CanonicalOrder, MappingError> {
    let external_order_id =
        pick_str(raw, &["AmazonOrderId"]).ok_or(MappingError::MissingField("AmazonOrderId"))?;

    let buyer = raw.get("BuyerInfo");
    let lines = raw
        .get("OrderItems")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(map_line).collect())
        .unwrap_or_default();

    Ok(CanonicalOrder {
        platform: PlatformType::Amazon,
        external_order_id: external_order_id.clone(),
        // Amazon has no separate human-facing number; the 3-7-7 id is it.
        order_number: Some(external_order_id),
        status: translate_status(STATUSES, pick_str(raw, &["OrderStatus"]).as_deref()),
        customer: Customer {
            full_name: buyer
                .and_then(|b| pick_str(b, &["BuyerName"]))
                .or_else(|| {
                    raw.get("ShippingAddress")
                        .and_then(|a| pick_str(a, &["Name"]))
                }),
            email: buyer.and_then(|b| pick_str(b, &["BuyerEmail"])),
            tc_id: None,
        },
        billing_address: map_address(raw.get("BillingAddress")),
        shipping_address: map_amazon_address(raw.get("ShippingAddress")),
        lines,
        cargo_tracking_number: pick_str(raw, &["TrackingNumber"]),
        total_amount: sp_money(raw.get("OrderTotal")).unwrap_or(0.0),
        total_discount_amount: sp_money(raw.get("PromotionDiscount")).unwrap_or(0.0),
        currency: raw
            .get("OrderTotal")
            .and_then(|m| pick_str(m, &["CurrencyCode"])),
        order_date: pick_datetime(raw, &["PurchaseDate"]),
        last_modified: pick_datetime(raw, &["LastUpdateDate", "PurchaseDate"]),
        raw: raw.clone(),
    })
}

/// SP-API addresses use PascalCase keys; re-key before the shared whitelist.
fn map_amazon_address(obj: Option<&Value>) -> super::canonical::Address {
    let Some(obj) = obj else {
        return super::canonical::Address::default();
    };
    let rekeyed = serde_json::json!({
        "fullName": obj.get("Name").cloned().unwrap_or(Value::Null),
        "address": obj.get("AddressLine1").cloned().unwrap_or(Value::Null),
        "city": obj.get("City").cloned().unwrap_or(Value::Null),
        "district": obj.get("County").cloned().unwrap_or(Value::Null),
        "postalCode": obj.get("PostalCode").cloned().unwrap_or(Value::Null),
        "country": obj.get("CountryCode").cloned().unwrap_or(Value::Null),
        "phone": obj.get("Phone").cloned().unwrap_or(Value::Null),
    });
    map_address(Some(&rekeyed))
}

fn map_line(line: &Value) -> OrderLine {
    OrderLine {
        product_id: None,
        external_line_id: pick_str(line, &["OrderItemId"]),
        title: pick_str(line, &["Title"]),
        quantity: pick_i64(line, &["QuantityOrdered"]).unwrap_or(0),
        price: sp_money(line.get("ItemPrice")).unwrap_or(0.0),
        discount: sp_money(line.get("PromotionDiscount")).unwrap_or(0.0),
        commission_rate: None,
        vat_rate: sp_money(line.get("ItemTax")),
        barcode: pick_str(line, &["ASIN"]),
        sku: pick_str(line, &["SellerSKU"]),
    }
}

pub fn map_product(raw: &Value) -> Result<CanonicalProduct, MappingError> {
    let external_product_id =
        pick_str(raw, &["ASIN", "asin"]).ok_or(MappingError::MissingField("ASIN"))?;
    Ok(CanonicalProduct {
        platform: PlatformType::Amazon,
        external_product_id,
        title: pick_str(raw, &["ItemName", "Title", "title"]),
        barcode: pick_str(raw, &["ASIN", "asin"]),
        stock_code: pick_str(raw, &["SellerSKU", "sellerSku"]),
        price: pick_f64(raw, &["Price", "price"])
            .or_else(|| sp_money(raw.get("ListingPrice")))
            .unwrap_or(0.0),
        quantity: pick_i64(raw, &["Quantity", "quantity"]).unwrap_or(0),
        raw: raw.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_sp_api_order() {
        let order = map_order(&json!({
            "AmazonOrderId": "406-1234567-7654321",
            "OrderStatus": "Unshipped",
            "PurchaseDate": "2024-06-30T08:00:00Z",
            "LastUpdateDate": "2024-06-30T09:30:00Z",
            "OrderTotal": {"CurrencyCode": "TRY", "Amount": "1250.00"},
            "BuyerInfo": {"BuyerEmail": "buyer@marketplace.amazon.com.tr"},
            "ShippingAddress": {
                "Name": "Zeynep Kaya",
                "AddressLine1": "Kordon Cad. 12/4",
                "City": "İzmir",
                "PostalCode": "35220",
                "CountryCode": "TR"
            },
            "OrderItems": [
                {
                    "OrderItemId": "1111222233334444",
                    "SellerSKU": "ZK-CASE-BLK",
                    "ASIN": "B0C1XYZABC",
                    "Title": "Telefon Kılıfı Siyah",
                    "QuantityOrdered": 2,
                    "ItemPrice": {"CurrencyCode": "TRY", "Amount": "625.00"}
                }
            ]
        }))
        .unwrap();
        assert_eq!(order.external_order_id, "406-1234567-7654321");
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.total_amount, 1250.0);
        assert_eq!(order.currency.as_deref(), Some("TRY"));
        assert_eq!(order.shipping_address.city.as_deref(), Some("İzmir"));
        assert_eq!(order.lines[0].sku.as_deref(), Some("ZK-CASE-BLK"));
        assert_eq!(order.customer.full_name.as_deref(), Some("Zeynep Kaya"));
    }

    #[test]
    fn unfulfillable_is_cancelled() {
        let order = map_order(&json!({
            "AmazonOrderId": "406-0-0",
            "OrderStatus": "Unfulfillable"
        }))
        .unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }
}
