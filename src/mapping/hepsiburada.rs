//! Hepsiburada package mapping.
//!
//! Hepsiburada nests money as `{ "amount": ..., "currency": ... }` objects
//! and ships items under `items[]` instead of `lines[]`. Timestamps are
//! RFC3339 strings.

use serde_json::Value;

use super::canonical::{
    CanonicalOrder, CanonicalProduct, Customer, OrderStatus, OrderLine, PlatformType,
};
use super::fields::{map_address, pick_datetime, pick_f64, pick_i64, pick_str, value_as_f64};
use super::{translate_status, MappingError};

pub(crate) const STATUSES: &[(&str, OrderStatus)] = &[
    ("Open", OrderStatus::Pending),
    ("PaymentCompleted", OrderStatus::Pending),
    ("Packaged", OrderStatus::Processing),
    ("ReadyToShip", OrderStatus::Processing),
    ("InTransit", OrderStatus::Shipped),
    ("Shipped", OrderStatus::Shipped),
    ("Delivered", OrderStatus::Delivered),
    ("CancelledByMerchant", OrderStatus::Cancelled),
    ("CancelledByCustomer", OrderStatus::Cancelled),
    ("CancelledByHb", OrderStatus::Cancelled),
    ("Returned", OrderStatus::Returned),
    ("ClaimCreated", OrderStatus::Returned),
];

/// `{"amount": 99.9, "currency": "TRY"}` or a bare number.
fn money(v: Option<&Value>) -> Option<f64> {
    let v = v?;
    if let Some(obj_amount) = v.get("amount") {
        return value_as_f64(obj_amount);
    }
    value_as_f64(v)
}

pub fn map_order(raw: &Value) -> Result<CanonicalOrder, MappingError> {
    let external_order_id = pick_str(raw, &["id", "packageNumber", "orderNumber"])
        .ok_or(MappingError::MissingField("id"))?;

    let customer_obj = raw.get("customer");
    let full_name = customer_obj
        .and_then(|c| pick_str(c, &["name", "fullName"]))
        .or_else(|| pick_str(raw, &["customerName", "recipientName"]));

    let lines = raw
        .get("items")
        .or_else(|| raw.get("lines"))
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(map_line).collect())
        .unwrap_or_default();

    Ok(CanonicalOrder {
        platform: PlatformType::Hepsiburada,
        external_order_id,
        order_number: pick_str(raw, &["orderNumber", "packageNumber"]),
        status: translate_status(
            STATUSES,
            pick_str(raw, &["status", "packageStatus"]).as_deref(),
        ),
        customer: Customer {
            full_name,
            email: customer_obj
                .and_then(|c| pick_str(c, &["email"]))
                .or_else(|| pick_str(raw, &["customerEmail", "email"])),
            tc_id: pick_str(raw, &["identityNo", "tcIdentityNumber"]),
        },
        billing_address: map_address(raw.get("billingAddress").or_else(|| raw.get("invoice"))),
        shipping_address: map_address(
            raw.get("deliveryAddress")
                .or_else(|| raw.get("shippingAddress")),
        ),
        lines,
        cargo_tracking_number: pick_str(raw, &["barcode", "cargoTrackingNumber"]),
        total_amount: money(raw.get("totalPrice"))
            .or_else(|| money(raw.get("totalAmount")))
            .unwrap_or(0.0),
        total_discount_amount: money(raw.get("totalDiscount")).unwrap_or(0.0),
        currency: raw
            .get("totalPrice")
            .and_then(|p| pick_str(p, &["currency"]))
            .or(Some("TRY".into())),
        order_date: pick_datetime(raw, &["orderDate", "createdDate"]),
        last_modified: pick_datetime(raw, &["lastStatusUpdateDate", "orderDate"]),
        raw: raw.clone(),
    })
}

fn map_line(line: &Value) -> OrderLine {
    OrderLine {
        product_id: None,
        external_line_id: pick_str(line, &["id", "lineItemId", "listingId"]),
        title: pick_str(line, &["productName", "name"]),
        quantity: pick_i64(line, &["quantity"]).unwrap_or(0),
        price: money(line.get("price"))
            .or_else(|| money(line.get("totalPrice")))
            .unwrap_or(0.0),
        discount: money(line.get("merchantDiscount"))
            .or_else(|| money(line.get("discount")))
            .unwrap_or(0.0),
        commission_rate: pick_f64(line, &["commissionRate", "commission"]),
        vat_rate: pick_f64(line, &["vatRate", "vat"]),
        barcode: pick_str(line, &["productBarcode", "barcode"]),
        sku: pick_str(line, &["merchantSku", "sku"]),
    }
}

pub fn map_product(raw: &Value) -> Result<CanonicalProduct, MappingError> {
    let external_product_id = pick_str(raw, &["hbSku", "hepsiburadaSku", "listingId", "id"])
        .ok_or(MappingError::MissingField("hbSku"))?;
    Ok(CanonicalProduct {
        platform: PlatformType::Hepsiburada,
        external_product_id,
        title: pick_str(raw, &["productName", "title"]),
        barcode: pick_str(raw, &["barcode", "productBarcode"]),
        stock_code: pick_str(raw, &["merchantSku", "stockCode"]),
        price: money(raw.get("price")).unwrap_or(0.0),
        quantity: pick_i64(raw, &["availableStock", "quantity"]).unwrap_or(0),
        raw: raw.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_nested_money_and_items() {
        let order = map_order(&json!({
            "id": "HB-PKG-123",
            "orderNumber": "300445566",
            "status": "InTransit",
            "customer": {"name": "Mehmet Demir", "email": "m@example.com"},
            "totalPrice": {"amount": 549.99, "currency": "TRY"},
            "orderDate": "2024-07-01T10:15:00+03:00",
            "deliveryAddress": {"fullName": "Mehmet Demir", "city": "Ankara"},
            "items": [
                {
                    "listingId": "L-9",
                    "quantity": 1,
                    "price": {"amount": 549.99, "currency": "TRY"},
                    "productBarcode": "8697778889990",
                    "merchantSku": "MD-549"
                }
            ]
        }))
        .unwrap();
        assert_eq!(order.external_order_id, "HB-PKG-123");
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.total_amount, 549.99);
        assert_eq!(order.currency.as_deref(), Some("TRY"));
        assert_eq!(order.lines[0].price, 549.99);
        assert!(order.order_date.is_some());
    }

    #[test]
    fn cancellation_variants_collapse() {
        for s in ["CancelledByMerchant", "CancelledByCustomer", "CancelledByHb"] {
            let order = map_order(&json!({"id": "1", "status": s})).unwrap();
            assert_eq!(order.status, OrderStatus::Cancelled, "{s}");
        }
    }
}
