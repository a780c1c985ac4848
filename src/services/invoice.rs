//! Invoice issuance: one PDF invoice per paid booking.

use chrono::{TimeZone, Utc};
use log::info;
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use rocket_dyn_templates::tera::{Context, Tera};
use serde::Serialize;

use crate::db::{self, BOOKINGS, CARS, INVOICES, USERS};
use crate::models::{generate_invoice_id, Booking, Car, Invoice, InvoiceStatus, User};
use crate::services::cloudinary::{CloudinaryService, ResourceType};
use crate::services::pdf;
use crate::utils::ApiError;

const TEMPLATE: &str = include_str!("../../templates/invoice.html.tera");
const ID_ATTEMPTS: usize = 5;

/// Values printed on the invoice.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDraft {
    pub invoice_number: String,
    pub issue_date: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub car_model: String,
    pub pickup_location: String,
    pub drop_location: String,
    pub pickup_date: String,
    pub drop_date: String,
    pub price: f64,
    pub gst: f64,
    pub gst_amount: f64,
    pub logistic: f64,
    pub total_amount: f64,
}

fn format_datetime(value: DateTime) -> String {
    Utc.timestamp_millis_opt(value.timestamp_millis())
        .single()
        .map(|dt| dt.format("%d/%m/%Y %H:%M").to_string())
        .unwrap_or_default()
}

impl InvoiceDraft {
    pub fn new(invoice_number: String, booking: &Booking, customer: &User, car: &Car) -> Self {
        InvoiceDraft {
            invoice_number,
            issue_date: Utc::now().format("%d/%m/%Y").to_string(),
            customer_name: customer.full_name(),
            customer_phone: booking.contact.clone(),
            car_model: car.model.clone(),
            pickup_location: booking.pickup_location.clone(),
            drop_location: booking.dropup_location.clone(),
            pickup_date: format_datetime(booking.pickup_dt),
            drop_date: format_datetime(booking.dropup_dt),
            price: booking.price,
            gst: booking.gst,
            gst_amount: booking.gst_amount,
            logistic: booking.logistic_charge,
            total_amount: booking.total_amount,
        }
    }

    pub fn render_html(&self) -> Result<String, ApiError> {
        let context = Context::from_serialize(self).map_err(|e| ApiError::internal("Invoice context", e))?;
        Tera::one_off(TEMPLATE, &context, true).map_err(|e| ApiError::internal("Invoice template", e))
    }
}

#[rocket::async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn find_by_booking(&self, booking_id: &ObjectId) -> Result<Option<Invoice>, ApiError>;
    async fn invoice_id_taken(&self, invoice_id: &str) -> Result<bool, ApiError>;
    /// `Ok(false)` when a unique index rejected the insert.
    async fn insert(&self, invoice: &Invoice) -> Result<bool, ApiError>;
}

#[rocket::async_trait]
pub trait InvoicePublisher: Send + Sync {
    /// Renders and stores the document, returning its public URL.
    async fn publish(&self, draft: &InvoiceDraft) -> Result<String, ApiError>;
}

#[rocket::async_trait]
impl InvoiceStore for Database {
    async fn find_by_booking(&self, booking_id: &ObjectId) -> Result<Option<Invoice>, ApiError> {
        Ok(self
            .collection::<Invoice>(INVOICES)
            .find_one(doc! { "booking_id": booking_id }, None)
            .await?)
    }

    async fn invoice_id_taken(&self, invoice_id: &str) -> Result<bool, ApiError> {
        let count = self
            .collection::<Invoice>(INVOICES)
            .count_documents(doc! { "invoice_id": invoice_id }, None)
            .await?;
        Ok(count > 0)
    }

    async fn insert(&self, invoice: &Invoice) -> Result<bool, ApiError> {
        match self.collection::<Invoice>(INVOICES).insert_one(invoice, None).await {
            Ok(_) => Ok(true),
            Err(e) if db::is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Chrome-rendered PDF uploaded to Cloudinary as a raw asset.
pub struct CloudPdfPublisher;

#[rocket::async_trait]
impl InvoicePublisher for CloudPdfPublisher {
    async fn publish(&self, draft: &InvoiceDraft) -> Result<String, ApiError> {
        let html = draft.render_html()?;
        let bytes = pdf::html_to_pdf(&html).await?;
        let public_id = format!("invoice-{}.pdf", draft.invoice_number);

        CloudinaryService::from_config()?
            .upload(
                bytes,
                &public_id,
                ResourceType::Raw,
                &CloudinaryService::folder("invoices"),
                Some(&public_id),
            )
            .await
    }
}

pub struct InvoiceService;

impl InvoiceService {
    /// Returns the booking's invoice, issuing it first if there is none.
    pub async fn issue<S, P>(
        store: &S,
        publisher: &P,
        booking: &Booking,
        customer: &User,
        car: &Car,
    ) -> Result<Invoice, ApiError>
    where
        S: InvoiceStore + ?Sized,
        P: InvoicePublisher + ?Sized,
    {
        let booking_oid = booking
            .id
            .ok_or_else(|| ApiError::internal("Invoice", "booking without id"))?;

        if let Some(existing) = store.find_by_booking(&booking_oid).await? {
            return Ok(existing);
        }

        let mut invoice_id = None;
        for _ in 0..ID_ATTEMPTS {
            let candidate = generate_invoice_id(Utc::now());
            if !store.invoice_id_taken(&candidate).await? {
                invoice_id = Some(candidate);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        let invoice_id = invoice_id
            .ok_or_else(|| ApiError::internal("Invoice", "could not allocate a free invoice id"))?;

        let draft = InvoiceDraft::new(invoice_id.clone(), booking, customer, car);
        let invoice_url = publisher.publish(&draft).await?;

        let now = DateTime::now();
        let invoice = Invoice {
            id: Some(ObjectId::new()),
            invoice_id,
            booking_id: booking_oid,
            invoice_url,
            status: InvoiceStatus::Paid,
            created_at: now,
            updated_at: now,
        };

        if store.insert(&invoice).await? {
            info!("Invoice {} issued for booking {}", invoice.invoice_id, booking.booking_id);
            return Ok(invoice);
        }

        // Lost a race: another request stored this booking's invoice first.
        store
            .find_by_booking(&booking_oid)
            .await?
            .ok_or_else(|| ApiError::conflict("Invoice number clash, please retry"))
    }

    /// Loads the booking with its customer and car and issues the invoice.
    pub async fn issue_for_booking(db: &Database, booking_id: &ObjectId) -> Result<Invoice, ApiError> {
        let booking = db
            .collection::<Booking>(BOOKINGS)
            .find_one(doc! { "_id": booking_id }, None)
            .await?
            .ok_or_else(|| ApiError::not_found("Booking not found"))?;

        let customer = db
            .collection::<User>(USERS)
            .find_one(doc! { "_id": booking.booked_by_id }, None)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        let car = db
            .collection::<Car>(CARS)
            .find_one(doc! { "_id": booking.booked_car_id }, None)
            .await?
            .ok_or_else(|| ApiError::not_found("Car not found"))?;

        Self::issue(db, &CloudPdfPublisher, &booking, &customer, &car).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::car::sample_car;
    use crate::models::user::sample_user;
    use crate::models::{BookingStatus, DeliveryStatus, PaymentStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        invoices: Mutex<Vec<Invoice>>,
    }

    #[rocket::async_trait]
    impl InvoiceStore for MemoryStore {
        async fn find_by_booking(&self, booking_id: &ObjectId) -> Result<Option<Invoice>, ApiError> {
            let invoices = self.invoices.lock().unwrap();
            Ok(invoices.iter().find(|i| &i.booking_id == booking_id).cloned())
        }

        async fn invoice_id_taken(&self, invoice_id: &str) -> Result<bool, ApiError> {
            let invoices = self.invoices.lock().unwrap();
            Ok(invoices.iter().any(|i| i.invoice_id == invoice_id))
        }

        async fn insert(&self, invoice: &Invoice) -> Result<bool, ApiError> {
            let mut invoices = self.invoices.lock().unwrap();
            if invoices.iter().any(|i| i.booking_id == invoice.booking_id) {
                return Ok(false);
            }
            invoices.push(invoice.clone());
            Ok(true)
        }
    }

    #[derive(Default)]
    struct CountingPublisher {
        calls: AtomicUsize,
    }

    #[rocket::async_trait]
    impl InvoicePublisher for CountingPublisher {
        async fn publish(&self, draft: &InvoiceDraft) -> Result<String, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("https://cdn.test/invoices/invoice-{}.pdf", draft.invoice_number))
        }
    }

    fn sample_booking(car: &Car, customer: &User) -> Booking {
        let now = DateTime::now();
        Booking {
            id: Some(ObjectId::new()),
            booking_id: "BK_250310_0905_07042_AB12".into(),
            booked_by_id: customer.id.unwrap(),
            booked_car_id: car.id.unwrap(),
            booking_name: "Asha Rao".into(),
            contact: "9876543210".into(),
            dl_no: "DL-0420110012345".into(),
            dob: "1995-04-12".into(),
            pickup_dt: now,
            dropup_dt: DateTime::from_millis(now.timestamp_millis() + 3_600_000),
            pickup_location: "Connaught Place".into(),
            dropup_location: "Airport T3".into(),
            price: 100.0,
            gst: 18.0,
            gst_amount: 18.0,
            logistic_charge: 250.0,
            total_amount: 368.0,
            status: BookingStatus::Confirm,
            delivery_status: DeliveryStatus::Pending,
            payment_status: PaymentStatus::Success,
            payment_id: Some("pay_P1".into()),
            payment_signature: None,
            refund_id: None,
            refund_amount: None,
            refund_date: None,
            assigned_agent_id: None,
            customer_otp: "123456".into(),
            customer_otp_verified: false,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn second_issue_returns_the_same_invoice() {
        let store = MemoryStore::default();
        let publisher = CountingPublisher::default();
        let car = sample_car();
        let customer = sample_user();
        let booking = sample_booking(&car, &customer);

        let first = InvoiceService::issue(&store, &publisher, &booking, &customer, &car).await.unwrap();
        let second = InvoiceService::issue(&store, &publisher, &booking, &customer, &car).await.unwrap();

        assert_eq!(first.invoice_id, second.invoice_id);
        assert_eq!(first.invoice_url, second.invoice_url);
        assert_eq!(first.status, InvoiceStatus::Paid);
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.invoices.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lost_race_yields_the_stored_invoice() {
        let store = MemoryStore::default();
        let publisher = CountingPublisher::default();
        let car = sample_car();
        let customer = sample_user();
        let booking = sample_booking(&car, &customer);

        let winner = Invoice {
            id: Some(ObjectId::new()),
            invoice_id: "INV-20250310-00001".into(),
            booking_id: booking.id.unwrap(),
            invoice_url: "https://cdn.test/winner.pdf".into(),
            status: InvoiceStatus::Paid,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        };

        // Simulates the other request committing between our lookup and insert.
        struct RacingStore {
            inner: MemoryStore,
            winner: Invoice,
            lookups: AtomicUsize,
        }

        #[rocket::async_trait]
        impl InvoiceStore for RacingStore {
            async fn find_by_booking(&self, booking_id: &ObjectId) -> Result<Option<Invoice>, ApiError> {
                if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Ok(None);
                }
                self.inner.find_by_booking(booking_id).await
            }

            async fn invoice_id_taken(&self, invoice_id: &str) -> Result<bool, ApiError> {
                self.inner.invoice_id_taken(invoice_id).await
            }

            async fn insert(&self, invoice: &Invoice) -> Result<bool, ApiError> {
                self.inner.invoices.lock().unwrap().push(self.winner.clone());
                self.inner.insert(invoice).await
            }
        }

        let racing = RacingStore { inner: store, winner: winner.clone(), lookups: AtomicUsize::new(0) };
        let got = InvoiceService::issue(&racing, &publisher, &booking, &customer, &car).await.unwrap();
        assert_eq!(got.invoice_id, winner.invoice_id);
        assert_eq!(got.invoice_url, winner.invoice_url);
    }

    #[test]
    fn template_renders_booking_values() {
        let car = sample_car();
        let customer = sample_user();
        let booking = sample_booking(&car, &customer);
        let html = InvoiceDraft::new("INV-20250310-07042".into(), &booking, &customer, &car)
            .render_html()
            .unwrap();

        assert!(html.contains("INV-20250310-07042"));
        assert!(html.contains("Hyundai Creta"));
        assert!(html.contains("Airport T3"));
        assert!(html.contains("368"));
        assert!(html.contains("GST (18"));
    }
}
