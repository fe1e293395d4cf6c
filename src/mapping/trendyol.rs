//! Trendyol shipment-package mapping.
//!
//! Trendyol splits the customer name into first/last fields and nests line
//! discounts per item; timestamps are epoch milliseconds.

use serde_json::Value;

use super::canonical::{
    CanonicalOrder, CanonicalProduct, Customer, OrderStatus, OrderLine, PlatformType,
};
use super::fields::{map_address, pick_datetime, pick_f64, pick_i64, pick_str};
use super::{translate_status, MappingError};

pub(crate) const STATUSES: &[(&str, OrderStatus)] = &[
    ("Awaiting", OrderStatus::Pending),
    ("Created", OrderStatus::Pending),
    ("Picking", OrderStatus::Processing),
    ("Invoiced", OrderStatus::Processing),
    ("Shipped", OrderStatus::Shipped),
    ("AtCollectionPoint", OrderStatus::Shipped),
    ("UnDelivered", OrderStatus::Shipped),
    ("Delivered", OrderStatus::Delivered),
    ("Cancelled", OrderStatus::Cancelled),
    ("UnSupplied", OrderStatus::Cancelled),
    ("Returned", OrderStatus::Returned),
];

pub fn map_order(raw: &Value) -> Result<CanonicalOrder, MappingError> {
    let external_order_id = pick_str(raw, &["id", "shipmentPackageId", "orderNumber"])
        .ok_or(MappingError::MissingField("id"))?;

    let full_name = match (
        pick_str(raw, &["customerFirstName"]),
        pick_str(raw, &["customerLastName"]),
    ) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        (Some(first), None) => Some(first),
        (None, Some(last)) => Some(last),
        (None, None) => pick_str(raw, &["customerFullName"]),
    };

    let lines = raw
        .get("lines")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(map_line).collect())
        .unwrap_or_default();

    Ok(CanonicalOrder {
        platform: PlatformType::Trendyol,
        external_order_id,
        order_number: pick_str(raw, &["orderNumber"]),
        status: translate_status(
            STATUSES,
            pick_str(raw, &["shipmentPackageStatus", "status"]).as_deref(),
        ),
        customer: Customer {
            full_name,
            email: pick_str(raw, &["customerEmail"]),
            tc_id: pick_str(raw, &["identityNumber", "tcIdentityNumber"]),
        },
        billing_address: map_address(raw.get("invoiceAddress")),
        shipping_address: map_address(raw.get("shipmentAddress")),
        lines,
        cargo_tracking_number: pick_str(raw, &["cargoTrackingNumber"]),
        total_amount: pick_f64(raw, &["totalPrice", "grossAmount"]).unwrap_or(0.0),
        total_discount_amount: pick_f64(raw, &["totalDiscount"]).unwrap_or(0.0),
        currency: pick_str(raw, &["currencyCode"]).or(Some("TRY".into())),
        order_date: pick_datetime(raw, &["orderDate"]),
        last_modified: pick_datetime(raw, &["lastModifiedDate", "orderDate"]),
        raw: raw.clone(),
    })
}

fn map_line(line: &Value) -> OrderLine {
    OrderLine {
        product_id: None,
        external_line_id: pick_str(line, &["id", "orderLineId"]),
        title: pick_str(line, &["productName"]),
        quantity: pick_i64(line, &["quantity"]).unwrap_or(0),
        price: pick_f64(line, &["price", "amount"]).unwrap_or(0.0),
        discount: pick_f64(line, &["discount", "tyDiscount"]).unwrap_or(0.0),
        commission_rate: pick_f64(line, &["commissionFee", "commissionRate"]),
        vat_rate: pick_f64(line, &["vatBaseAmount", "vatRate"]),
        barcode: pick_str(line, &["barcode"]),
        sku: pick_str(line, &["merchantSku", "sku"]),
    }
}

pub fn map_product(raw: &Value) -> Result<CanonicalProduct, MappingError> {
    // Trendyol identifies catalogue rows by barcode; productMainId groups variants.
    let external_product_id = pick_str(raw, &["id", "productMainId", "barcode"])
        .ok_or(MappingError::MissingField("barcode"))?;
    Ok(CanonicalProduct {
        platform: PlatformType::Trendyol,
        external_product_id,
        title: pick_str(raw, &["title", "productName"]),
        barcode: pick_str(raw, &["barcode"]),
        stock_code: pick_str(raw, &["stockCode", "merchantSku"]),
        price: pick_f64(raw, &["salePrice", "listPrice"]).unwrap_or(0.0),
        quantity: pick_i64(raw, &["quantity", "stockAmount"]).unwrap_or(0),
        raw: raw.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn combines_split_customer_name() {
        let order = map_order(&json!({
            "id": 880011,
            "orderNumber": "TY-5566",
            "status": "Picking",
            "customerFirstName": "Ayşe",
            "customerLastName": "Yılmaz",
            "totalPrice": 149.90,
            "lines": [
                {"quantity": 2, "price": 74.95, "barcode": "8690001112223", "merchantSku": "KLM-01"}
            ]
        }))
        .unwrap();
        assert_eq!(order.customer.full_name.as_deref(), Some("Ayşe Yılmaz"));
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.lines[0].quantity, 2);
    }

    #[test]
    fn unsupplied_maps_to_cancelled() {
        let order = map_order(&json!({"id": 1, "status": "UnSupplied"})).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }
}
