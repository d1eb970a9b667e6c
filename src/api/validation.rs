//! Input validation for API requests.
//!
//! Field validators return `Result<(), String>`; the `validate_*_request`
//! functions collect them into one `ApiError` through the
//! `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

use super::error::{ApiError, ValidationErrorBuilder};
use crate::db::{
    CreateBarberRequest, CreateBookingRequest, CreateContactRequest, CreateCustomerRequest,
    CreateOrderRequest, UpdateBarberRequest,
};
use crate::scheduling::{WorkingHours, WorkingWindow};

const MAX_NAME_LEN: usize = 100;
const MAX_TEXT_LEN: usize = 2000;
const MAX_ORDER_LINES: usize = 50;

lazy_static! {
    /// Pragmatic email shape check: one @, no spaces, a dot in the domain
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s]+@[^@\s]+\.[^@\s]+$"
    ).unwrap();

    /// Digits with optional leading +, spaces, dashes, dots and parentheses
    static ref PHONE_REGEX: Regex = Regex::new(
        r"^\+?[0-9(][0-9 ().-]{6,19}$"
    ).unwrap();
}

pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

pub fn validate_phone(phone: &str) -> Result<(), String> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err("Phone number is required".to_string());
    }
    if !PHONE_REGEX.is_match(phone) {
        return Err("Invalid phone number".to_string());
    }
    Ok(())
}

pub fn validate_optional_phone(phone: &Option<String>) -> Result<(), String> {
    match phone.as_deref().map(str::trim) {
        None | Some("") => Ok(()),
        Some(phone) => validate_phone(phone),
    }
}

pub fn validate_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Name is required".to_string());
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(format!("Name is too long (max {} characters)", MAX_NAME_LEN));
    }
    Ok(())
}

fn validate_text(value: &str, label: &str, required: bool) -> Result<(), String> {
    if required && value.trim().is_empty() {
        return Err(format!("{} is required", label));
    }
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(format!("{} is too long (max {} characters)", label, MAX_TEXT_LEN));
    }
    Ok(())
}

fn validate_optional_text(value: &Option<String>, label: &str) -> Result<(), String> {
    value
        .as_deref()
        .map_or(Ok(()), |value| validate_text(value, label, false))
}

pub fn validate_working_hours(hours: &Option<WorkingHours>) -> Result<(), String> {
    match hours {
        Some(hours) => WorkingWindow::parse(&hours.start, &hours.end)
            .map(|_| ())
            .map_err(|e| e.to_string()),
        None => Ok(()),
    }
}

pub fn validate_create_barber_request(req: &CreateBarberRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_name(&req.name));
    if let Some(email) = &req.email {
        errors.check("email", validate_email(email));
    }
    errors.check("phone", validate_optional_phone(&req.phone));
    errors.check("bio", validate_optional_text(&req.bio, "Bio"));
    errors.check("working_hours", validate_working_hours(&req.working_hours));
    errors.finish()
}

pub fn validate_update_barber_request(req: &UpdateBarberRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &req.name {
        errors.check("name", validate_name(name));
    }
    if let Some(email) = &req.email {
        errors.check("email", validate_email(email));
    }
    errors.check("phone", validate_optional_phone(&req.phone));
    errors.check("bio", validate_optional_text(&req.bio, "Bio"));
    errors.check("working_hours", validate_working_hours(&req.working_hours));
    errors.finish()
}

/// Shape checks only. Date, time and availability are the booking service's.
pub fn validate_create_booking_request(req: &CreateBookingRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("service", validate_text(&req.service, "Service", true));
    errors.check("customer_name", validate_name(&req.customer_name));
    errors.check("email", validate_email(&req.email));
    errors.check("phone", validate_phone(&req.phone));
    errors.check("notes", validate_optional_text(&req.notes, "Notes"));
    errors.finish()
}

pub fn validate_create_order_request(req: &CreateOrderRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("customer_name", validate_name(&req.customer_name));
    errors.check("email", validate_email(&req.email));
    errors.check("phone", validate_optional_phone(&req.phone));
    errors.check("address", validate_optional_text(&req.address, "Address"));
    if req.items.is_empty() {
        errors.add("items", "An order needs at least one item");
    } else if req.items.len() > MAX_ORDER_LINES {
        errors.add("items", format!("Too many order lines (max {})", MAX_ORDER_LINES));
    }
    for line in &req.items {
        if line.product_id.trim().is_empty() {
            errors.add("items", "Every line needs a product_id");
        }
        if line.quantity <= 0 {
            errors.add("items", format!("Quantity for {} must be positive", line.product_id));
        }
    }
    errors.finish()
}

pub fn validate_create_contact_request(req: &CreateContactRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_name(&req.name));
    errors.check("email", validate_email(&req.email));
    errors.check("phone", validate_optional_phone(&req.phone));
    errors.check("subject", validate_optional_text(&req.subject, "Subject"));
    errors.check("message", validate_text(&req.message, "Message", true));
    errors.finish()
}

pub fn validate_create_customer_request(req: &CreateCustomerRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_name(&req.name));
    errors.check("email", validate_email(&req.email));
    errors.check("phone", validate_optional_phone(&req.phone));
    errors.finish()
}
