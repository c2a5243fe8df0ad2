pub mod customer;
pub mod order;
pub mod order_line;
pub mod product;
pub mod product_variant;
pub mod shipping_method;
pub mod tenant;
