//! N11 order/product mapping.
//!
//! The N11 order service exposes shipment packages with lowercase-j camelCase
//! quirks (`customerfullName`) and epoch-millisecond timestamps. Field
//! aliases below follow the payloads the seller API actually returns, newest
//! variant first.

use serde_json::Value;

use super::canonical::{
    CanonicalOrder, CanonicalProduct, Customer, OrderStatus, OrderLine, PlatformType,
};
use super::fields::{map_address, pick_datetime, pick_f64, pick_i64, pick_str};
use super::{translate_status, MappingError};

/// `shipmentPackageStatus` labels seen in the wild, including the legacy
/// UnDelivered spelling.
pub(crate) const STATUSES: &[(&str, OrderStatus)] = &[
    ("Created", OrderStatus::Pending),
    ("ReadyToShip", OrderStatus::Processing),
    ("Picking", OrderStatus::Processing),
    ("Invoiced", OrderStatus::Processing),
    ("Shipped", OrderStatus::Shipped),
    ("AtCollectionPoint", OrderStatus::Shipped),
    ("Delivered", OrderStatus::Delivered),
    ("UnDelivered", OrderStatus::Shipped),
    ("Cancelled", OrderStatus::Cancelled),
    ("UnPacked", OrderStatus::Pending),
    ("Returned", OrderStatus::Returned),
];

pub fn map_order(raw: &Value) -> Result<CanonicalOrder, MappingError> {
    let external_order_id =
        pick_str(raw, &["id", "orderId"]).ok_or(MappingError::MissingField("id"))?;

    let lines = raw
        .get("lines")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(map_line).collect())
        .unwrap_or_default();

    Ok(CanonicalOrder {
        platform: PlatformType::N11,
        external_order_id,
        order_number: pick_str(raw, &["orderNumber"]),
        status: translate_status(
            STATUSES,
            pick_str(raw, &["shipmentPackageStatus", "status"]).as_deref(),
        ),
        customer: Customer {
            full_name: pick_str(raw, &["customerFullName", "customerfullName", "customerName"]),
            email: pick_str(raw, &["customerEmail", "email"]),
            tc_id: pick_str(raw, &["tcIdentityNumber", "taxId"]),
        },
        billing_address: map_address(raw.get("billingAddress")),
        shipping_address: map_address(raw.get("shippingAddress")),
        lines,
        cargo_tracking_number: pick_str(raw, &["cargoTrackingNumber", "cargoTrackingNo"]),
        total_amount: pick_f64(raw, &["totalAmount", "grossAmount"]).unwrap_or(0.0),
        total_discount_amount: pick_f64(raw, &["totalDiscountAmount", "totalDiscount"])
            .unwrap_or(0.0),
        currency: pick_str(raw, &["currency", "currencyCode"]).or(Some("TRY".into())),
        order_date: pick_datetime(raw, &["orderDate", "createDate"]),
        last_modified: pick_datetime(raw, &["lastModifiedDate", "updatedDate", "orderDate"]),
        raw: raw.clone(),
    })
}

fn map_line(line: &Value) -> OrderLine {
    OrderLine {
        product_id: None,
        external_line_id: pick_str(line, &["id", "orderItemId", "lineId"]),
        title: pick_str(line, &["productName", "title"]),
        quantity: pick_i64(line, &["quantity"]).unwrap_or(0),
        price: pick_f64(line, &["price", "sellerInvoiceAmount", "dueAmount"]).unwrap_or(0.0),
        discount: pick_f64(line, &["totalDiscountAmount", "discount", "sellerDiscount"])
            .unwrap_or(0.0),
        commission_rate: pick_f64(line, &["commission", "commissionRate"]),
        vat_rate: pick_f64(line, &["vatRate", "vatBaseAmount"]),
        barcode: pick_str(line, &["barcode", "gtin"]),
        sku: pick_str(line, &["merchantSku", "sellerStockCode", "stockCode"]),
    }
}

pub fn map_product(raw: &Value) -> Result<CanonicalProduct, MappingError> {
    let external_product_id = pick_str(raw, &["n11ProductId", "productId", "id"])
        .ok_or(MappingError::MissingField("productId"))?;
    Ok(CanonicalProduct {
        platform: PlatformType::N11,
        external_product_id,
        title: pick_str(raw, &["title", "productName"]),
        barcode: pick_str(raw, &["barcode", "gtin"]),
        stock_code: pick_str(raw, &["stockCode", "sellerStockCode", "merchantSku"]),
        price: pick_f64(raw, &["salePrice", "displayPrice", "price"]).unwrap_or(0.0),
        quantity: pick_i64(raw, &["quantity", "stockCount"]).unwrap_or(0),
        raw: raw.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Shipment package shape captured from a live seller account (values
    /// anonymized except the accounting-relevant ones).
    fn sample_order() -> Value {
        json!({
            "id": 112964324974270i64,
            "orderNumber": "204123935736",
            "shipmentPackageStatus": "Delivered",
            "customerfullName": "Emre Altındağ",
            "customerEmail": "emre@example.com",
            "tcIdentityNumber": "11111111110",
            "totalAmount": 282.33,
            "totalDiscountAmount": 25.0,
            "cargoTrackingNumber": "7250011223344",
            "orderDate": 1719830000000i64,
            "lastModifiedDate": 1719903600000i64,
            "billingAddress": {
                "fullName": "Emre Altındağ",
                "address": "Atatürk Mah. Çiçek Sok. No:3",
                "city": "İstanbul",
                "district": "Maltepe",
                "postalCode": "34840"
            },
            "shippingAddress": {
                "fullName": "Emre Altındağ",
                "address": "Atatürk Mah. Çiçek Sok. No:3",
                "city": "İstanbul",
                "district": "Maltepe",
                "postalCode": "34840",
                "gsm": "5301112233"
            },
            "lines": [
                {
                    "id": 9981,
                    "productName": "Paslanmaz Çelik Termos 750ml",
                    "quantity": 1,
                    "price": 282.33,
                    "totalDiscountAmount": 25.0,
                    "commission": 12.5,
                    "vatRate": 20,
                    "barcode": "8691234567890",
                    "merchantSku": "TRM-750-SLV"
                }
            ],
            "packageHistories": [
                {"status": "Created", "createdDate": 1719830000000i64},
                {"status": "Shipped", "createdDate": 1719850000000i64}
            ]
        })
    }

    #[test]
    fn maps_reference_order() {
        let order = map_order(&sample_order()).unwrap();
        assert_eq!(order.external_order_id, "112964324974270");
        assert_eq!(order.order_number.as_deref(), Some("204123935736"));
        assert_eq!(order.customer.full_name.as_deref(), Some("Emre Altındağ"));
        assert_eq!(order.total_amount, 282.33);
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.lines[0].barcode.as_deref(), Some("8691234567890"));
        assert_eq!(order.lines[0].sku.as_deref(), Some("TRM-750-SLV"));
        assert!(order.lines[0].product_id.is_none());
    }

    #[test]
    fn input_is_not_mutated_and_raw_is_retained() {
        let payload = sample_order();
        let before = payload.clone();
        let order = map_order(&payload).unwrap();
        assert_eq!(payload, before);
        assert_eq!(order.raw, before);
    }

    #[test]
    fn missing_optionals_default_instead_of_failing() {
        let order = map_order(&json!({"id": "77"})).unwrap();
        assert_eq!(order.external_order_id, "77");
        assert_eq!(order.status, OrderStatus::Unknown);
        assert_eq!(order.total_amount, 0.0);
        assert!(order.lines.is_empty());
        assert!(order.shipping_address.is_empty());
    }

    #[test]
    fn missing_id_is_a_typed_error() {
        assert_eq!(
            map_order(&json!({"orderNumber": "X"})).unwrap_err(),
            MappingError::MissingField("id")
        );
    }
}
