//! In-memory storefront reachable through the [`Browser`] seam
//!
//! Models the pages of a small shop (login, inventory, product details,
//! cart, two-step checkout) closely enough for UI scenarios to run without
//! a WebDriver server. Element handles are node ids of the rendered page;
//! a handle that is no longer rendered is stale.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use scenario::driver::{Browser, BrowserLauncher, By, ElementRef};
use scenario::{Error, Result};

pub const ORIGIN: &str = "https://shop.test";

struct Item {
    number: usize,
    name: &'static str,
    slug: &'static str,
    price_cents: u64,
}

const ITEMS: [Item; 6] = [
    Item { number: 4, name: "Sauce Labs Backpack", slug: "sauce-labs-backpack", price_cents: 2999 },
    Item { number: 0, name: "Sauce Labs Bike Light", slug: "sauce-labs-bike-light", price_cents: 999 },
    Item { number: 1, name: "Sauce Labs Bolt T-Shirt", slug: "sauce-labs-bolt-t-shirt", price_cents: 1599 },
    Item { number: 5, name: "Sauce Labs Fleece Jacket", slug: "sauce-labs-fleece-jacket", price_cents: 4999 },
    Item { number: 2, name: "Sauce Labs Onesie", slug: "sauce-labs-onesie", price_cents: 799 },
    Item {
        number: 3,
        name: "Test.allTheThings() T-Shirt (Red)",
        slug: "test.allthethings()-t-shirt-(red)",
        price_cents: 1599,
    },
];

fn dollars(cents: u64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

fn item_by_slug(slug: &str) -> Option<usize> {
    ITEMS.iter().position(|item| item.slug == slug)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Login,
    Inventory,
    Details(usize),
    Cart,
    CheckoutInfo,
    CheckoutOverview,
    Complete,
}

impl Page {
    fn path(&self) -> String {
        match self {
            Page::Login => "/".to_string(),
            Page::Inventory => "/inventory.html".to_string(),
            Page::Details(index) => format!("/inventory-item.html?id={}", ITEMS[*index].number),
            Page::Cart => "/cart.html".to_string(),
            Page::CheckoutInfo => "/checkout-step-one.html".to_string(),
            Page::CheckoutOverview => "/checkout-step-two.html".to_string(),
            Page::Complete => "/checkout-complete.html".to_string(),
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Page::Login => "",
            Page::Inventory => "Products",
            Page::Details(_) => "",
            Page::Cart => "Your Cart",
            Page::CheckoutInfo => "Checkout: Your Information",
            Page::CheckoutOverview => "Checkout: Overview",
            Page::Complete => "Checkout: Complete!",
        }
    }
}

/// One rendered element
#[derive(Debug, Clone)]
struct Node {
    id: String,
    parent: Option<String>,
    tag: &'static str,
    classes: Vec<&'static str>,
    attrs: BTreeMap<String, String>,
    text: String,
    visible: bool,
}

impl Node {
    fn new(id: impl Into<String>, tag: &'static str) -> Self {
        Self {
            id: id.into(),
            parent: None,
            tag,
            classes: Vec::new(),
            attrs: BTreeMap::new(),
            text: String::new(),
            visible: true,
        }
    }

    fn class(mut self, class: &'static str) -> Self {
        self.classes.push(class);
        self
    }

    fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Element carrying a `data-test` attribute equal to its id
    fn test_id(id: &str, tag: &'static str) -> Self {
        Self::new(id, tag).attr("data-test", id)
    }

    fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    fn under(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    fn shown(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    fn matches(&self, selector: &str) -> bool {
        selector.split(',').map(str::trim).any(|part| self.matches_simple(part))
    }

    /// `tag`, `.class`, `#id`, `[name="value"]`, optionally prefixed by a tag
    fn matches_simple(&self, selector: &str) -> bool {
        let split = selector
            .find(|c: char| c == '.' || c == '#' || c == '[')
            .unwrap_or(selector.len());
        let (tag, rest) = selector.split_at(split);
        if !tag.is_empty() && tag != self.tag {
            return false;
        }
        if rest.is_empty() {
            return !tag.is_empty();
        }
        if let Some(class) = rest.strip_prefix('.') {
            return self.classes.contains(&class);
        }
        if let Some(id) = rest.strip_prefix('#') {
            return self.attrs.get("id").map(String::as_str) == Some(id);
        }
        if let Some(attr) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            return match attr.split_once('=') {
                Some((name, value)) => {
                    let value = value.trim_matches('"').trim_matches('\'').replace("\\\"", "\"");
                    self.attrs.get(name) == Some(&value)
                }
                None => self.attrs.contains_key(attr),
            };
        }
        false
    }
}

fn is_below(nodes: &[Node], node: &Node, ancestor: &str) -> bool {
    let mut parent = node.parent.as_deref();
    while let Some(id) = parent {
        if id == ancestor {
            return true;
        }
        parent = nodes.iter().find(|n| n.id == id).and_then(|n| n.parent.as_deref());
    }
    false
}

/// Session state of one browser
#[derive(Debug)]
struct Shop {
    page: Page,
    logged_in: bool,
    fields: BTreeMap<String, String>,
    error: Option<String>,
    /// Stored cart contents
    cart: BTreeSet<usize>,
    /// Items whose button currently reads "Remove"; only a reload resyncs it with the cart
    labels: BTreeSet<usize>,
    sort: String,
    menu_open: bool,
    render_delay: usize,
    pending_renders: usize,
    closed: bool,
}

impl Shop {
    fn new(render_delay: usize) -> Self {
        Self {
            page: Page::Login,
            logged_in: false,
            fields: BTreeMap::new(),
            error: None,
            cart: BTreeSet::new(),
            labels: BTreeSet::new(),
            sort: "az".to_string(),
            menu_open: false,
            render_delay,
            pending_renders: 0,
            closed: false,
        }
    }

    fn go(&mut self, page: Page) {
        self.page = page;
        self.error = None;
        self.menu_open = false;
        self.fields.clear();
        self.pending_renders = self.render_delay;
    }

    fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    fn sorted_items(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..ITEMS.len()).collect();
        match self.sort.as_str() {
            "za" => order.sort_by(|a, b| ITEMS[*b].name.cmp(ITEMS[*a].name)),
            "lohi" => order.sort_by_key(|i| ITEMS[*i].price_cents),
            "hilo" => order.sort_by_key(|i| std::cmp::Reverse(ITEMS[*i].price_cents)),
            _ => order.sort_by(|a, b| ITEMS[*a].name.cmp(ITEMS[*b].name)),
        }
        order
    }

    fn add(&mut self, index: usize) {
        self.cart.insert(index);
        self.labels.insert(index);
    }

    fn remove(&mut self, index: usize) {
        self.cart.remove(&index);
        self.labels.remove(&index);
    }

    fn login(&mut self) {
        let username = self.field("username").to_string();
        let password = self.field("password").to_string();
        let error = if username.is_empty() {
            "Epic sadface: Username is required"
        } else if password.is_empty() {
            "Epic sadface: Password is required"
        } else if password != "secret_sauce" {
            "Epic sadface: Username and password do not match any user in this service"
        } else if username == "locked_out_user" {
            "Epic sadface: Sorry, this user has been locked out."
        } else if username == "standard_user" {
            self.logged_in = true;
            self.go(Page::Inventory);
            return;
        } else {
            "Epic sadface: Username and password do not match any user in this service"
        };
        self.error = Some(error.to_string());
    }

    fn submit_information(&mut self) {
        let missing = [
            ("firstName", "Error: First Name is required"),
            ("lastName", "Error: Last Name is required"),
            ("postalCode", "Error: Postal Code is required"),
        ]
        .into_iter()
        .find(|(field, _)| self.field(field).is_empty());
        match missing {
            Some((_, error)) => self.error = Some(error.to_string()),
            None => self.go(Page::CheckoutOverview),
        }
    }

    fn click(&mut self, id: &str) {
        match id {
            "login-button" => self.login(),
            "shopping-cart-link" => self.go(Page::Cart),
            "menu-btn" => self.menu_open = true,
            "menu-close" => self.menu_open = false,
            "logout" => {
                self.logged_in = false;
                self.go(Page::Login);
            }
            "reset" => self.cart.clear(),
            "checkout" => self.go(Page::CheckoutInfo),
            "continue-shopping" | "back-to-products" => self.go(Page::Inventory),
            "continue" => self.submit_information(),
            "cancel" => match self.page {
                Page::CheckoutInfo => self.go(Page::Cart),
                _ => self.go(Page::Inventory),
            },
            "finish" => {
                self.cart.clear();
                self.labels.clear();
                self.go(Page::Complete);
            }
            "add-to-cart" | "remove" => {
                if let Page::Details(index) = self.page {
                    if id == "remove" {
                        self.remove(index);
                    } else {
                        self.add(index);
                    }
                }
            }
            _ => {
                if let Some(sort) = id.strip_prefix("option-") {
                    self.sort = sort.to_string();
                } else if let Some(index) = id.strip_prefix("add-to-cart-").and_then(item_by_slug) {
                    self.add(index);
                } else if let Some(index) = id.strip_prefix("remove-").and_then(item_by_slug) {
                    self.remove(index);
                } else if let Some(index) = id
                    .strip_prefix("item-")
                    .and_then(|rest| rest.strip_suffix("-title-link"))
                    .and_then(|n| n.parse::<usize>().ok())
                    .and_then(|n| ITEMS.iter().position(|item| item.number == n))
                {
                    self.go(Page::Details(index));
                }
            }
        }
    }

    fn goto(&mut self, url: &str) -> Result<()> {
        let path = url
            .strip_prefix(ORIGIN)
            .ok_or_else(|| Error::Driver(format!("Unknown origin in '{}'", url)))?;
        let page = match path {
            "" | "/" => Page::Login,
            "/inventory.html" => Page::Inventory,
            "/cart.html" => Page::Cart,
            other => return Err(Error::Driver(format!("No page at '{}'", other))),
        };
        if page != Page::Login && !self.logged_in {
            self.go(Page::Login);
            self.error = Some(format!(
                "Epic sadface: You can only access '{}' when you are logged in.",
                path
            ));
        } else {
            self.go(page);
        }
        Ok(())
    }

    fn refresh(&mut self) {
        self.labels = self.cart.clone();
        if !self.logged_in && self.page != Page::Login {
            self.go(Page::Login);
        } else {
            let page = self.page;
            self.go(page);
        }
    }

    fn render(&self) -> Vec<Node> {
        let mut nodes = Vec::new();
        match self.page {
            Page::Login => {
                nodes.push(Node::test_id("username", "input").attr("id", "user-name"));
                nodes.push(Node::test_id("password", "input").attr("id", "password"));
                nodes.push(Node::test_id("login-button", "input").attr("id", "login-button"));
            }
            page => {
                self.render_header(&mut nodes);
                match page {
                    Page::Inventory => self.render_inventory(&mut nodes),
                    Page::Details(index) => self.render_details(&mut nodes, index),
                    Page::Cart => {
                        self.render_lines(&mut nodes, true);
                        nodes.push(Node::test_id("continue-shopping", "button"));
                        nodes.push(Node::test_id("checkout", "button"));
                    }
                    Page::CheckoutInfo => {
                        for field in ["firstName", "lastName", "postalCode"] {
                            nodes.push(Node::test_id(field, "input"));
                        }
                        nodes.push(Node::test_id("continue", "input"));
                        nodes.push(Node::test_id("cancel", "button"));
                    }
                    Page::CheckoutOverview => self.render_overview(&mut nodes),
                    Page::Complete => {
                        nodes.push(
                            Node::new("complete-header", "h2")
                                .class("complete-header")
                                .text("Thank you for your order!"),
                        );
                        nodes.push(Node::test_id("back-to-products", "button"));
                    }
                    Page::Login => {}
                }
            }
        }
        if let Some(error) = &self.error {
            nodes.push(Node::test_id("error", "h3").text(error.clone()));
        }
        nodes
    }

    fn render_header(&self, nodes: &mut Vec<Node>) {
        nodes.push(
            Node::test_id("shopping-cart-link", "a").class("shopping_cart_link"),
        );
        if !self.cart.is_empty() {
            nodes.push(
                Node::new("cart-badge", "span")
                    .class("shopping_cart_badge")
                    .under("shopping-cart-link")
                    .text(self.cart.len().to_string()),
            );
        }
        nodes.push(Node::new("menu-btn", "button").attr("id", "react-burger-menu-btn"));
        nodes.push(Node::new("menu", "div").class("bm-menu").shown(self.menu_open));
        for (id, html_id) in [
            ("logout", "logout_sidebar_link"),
            ("reset", "reset_sidebar_link"),
            ("menu-close", "react-burger-cross-btn"),
        ] {
            nodes.push(
                Node::new(id, "a")
                    .attr("id", html_id)
                    .under("menu")
                    .shown(self.menu_open),
            );
        }
        let title = self.page.title();
        if !title.is_empty() {
            nodes.push(Node::new("title", "span").class("title").text(title));
        }
    }

    fn render_inventory(&self, nodes: &mut Vec<Node>) {
        nodes.push(Node::test_id("product-sort-container", "select"));
        for value in ["az", "za", "lohi", "hilo"] {
            nodes.push(
                Node::new(format!("option-{}", value), "option")
                    .attr("value", value)
                    .under("product-sort-container"),
            );
        }
        for index in self.sorted_items() {
            let item = &ITEMS[index];
            let row = format!("item-{}", item.slug);
            let link = format!("item-{}-title-link", item.number);
            nodes.push(Node::new(row.clone(), "div").class("inventory_item"));
            nodes.push(Node::test_id(&link, "a").under(&row));
            nodes.push(
                Node::new(format!("{}-name", row), "div")
                    .class("inventory_item_name")
                    .under(&link)
                    .text(item.name),
            );
            nodes.push(
                Node::new(format!("{}-desc", row), "div")
                    .class("inventory_item_desc")
                    .under(&row)
                    .text(format!("{} description", item.name)),
            );
            nodes.push(
                Node::new(format!("{}-price", row), "div")
                    .class("inventory_item_price")
                    .under(&row)
                    .text(dollars(item.price_cents)),
            );
            let button = if self.labels.contains(&index) {
                format!("remove-{}", item.slug)
            } else {
                format!("add-to-cart-{}", item.slug)
            };
            nodes.push(Node::test_id(&button, "button").under(&row));
        }
    }

    fn render_details(&self, nodes: &mut Vec<Node>, index: usize) {
        let item = &ITEMS[index];
        nodes.push(Node::new("details-img", "img").class("inventory_details_img"));
        nodes.push(
            Node::new("details-name", "div")
                .class("inventory_details_name")
                .text(item.name),
        );
        nodes.push(
            Node::new("details-price", "div")
                .class("inventory_details_price")
                .text(dollars(item.price_cents)),
        );
        let button = if self.labels.contains(&index) { "remove" } else { "add-to-cart" };
        nodes.push(Node::test_id(button, "button"));
        nodes.push(Node::test_id("back-to-products", "button"));
    }

    /// Cart rows, shared by the cart and the checkout overview
    fn render_lines(&self, nodes: &mut Vec<Node>, removable: bool) {
        for index in &self.cart {
            let item = &ITEMS[*index];
            let row = format!("cart-{}", item.slug);
            nodes.push(Node::new(row.clone(), "div").class("cart_item"));
            nodes.push(
                Node::new(format!("{}-qty", row), "div")
                    .class("cart_quantity")
                    .under(&row)
                    .text("1"),
            );
            nodes.push(
                Node::new(format!("{}-name", row), "div")
                    .class("inventory_item_name")
                    .under(&row)
                    .text(item.name),
            );
            nodes.push(
                Node::new(format!("{}-price", row), "div")
                    .class("inventory_item_price")
                    .under(&row)
                    .text(dollars(item.price_cents)),
            );
            if removable {
                nodes.push(Node::test_id(&format!("remove-{}", item.slug), "button").under(&row));
            }
        }
    }

    fn render_overview(&self, nodes: &mut Vec<Node>) {
        self.render_lines(nodes, false);
        let subtotal: u64 = self.cart.iter().map(|i| ITEMS[*i].price_cents).sum();
        // 8% tax, rounded half up to the cent
        let tax = (subtotal * 8 + 50) / 100;
        nodes.push(
            Node::new("subtotal", "div")
                .class("summary_subtotal_label")
                .text(format!("Item total: {}", dollars(subtotal))),
        );
        nodes.push(
            Node::new("tax", "div")
                .class("summary_tax_label")
                .text(format!("Tax: {}", dollars(tax))),
        );
        nodes.push(
            Node::new("total", "div")
                .class("summary_total_label")
                .text(format!("Total: {}", dollars(subtotal + tax))),
        );
        nodes.push(Node::test_id("finish", "button"));
        nodes.push(Node::test_id("cancel", "button"));
    }
}

/// A browser session on the in-memory storefront
pub struct Storefront {
    shop: Mutex<Shop>,
    closes: Arc<AtomicUsize>,
}

impl Storefront {
    pub fn new(render_delay: usize, closes: Arc<AtomicUsize>) -> Self {
        Self {
            shop: Mutex::new(Shop::new(render_delay)),
            closes,
        }
    }

    fn shop(&self) -> Result<MutexGuard<'_, Shop>> {
        let shop = self
            .shop
            .lock()
            .map_err(|_| Error::Driver("storefront state poisoned".to_string()))?;
        if shop.closed {
            return Err(Error::Driver("session is closed".to_string()));
        }
        Ok(shop)
    }

    fn node(&self, element: &ElementRef) -> Result<Node> {
        self.shop()?
            .render()
            .into_iter()
            .find(|n| n.id == element.0)
            .ok_or_else(|| Error::StaleElement(element.0.clone()))
    }
}

#[async_trait]
impl Browser for Storefront {
    async fn goto(&self, url: &str) -> Result<()> {
        self.shop()?.goto(url)
    }

    async fn refresh(&self) -> Result<()> {
        self.shop()?.refresh();
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(format!("{}{}", ORIGIN, self.shop()?.page.path()))
    }

    async fn find_elements(&self, scope: Option<&ElementRef>, by: &By) -> Result<Vec<ElementRef>> {
        let mut shop = self.shop()?;
        if scope.is_none() && shop.pending_renders > 0 {
            shop.pending_renders -= 1;
            return Ok(Vec::new());
        }
        let nodes = shop.render();
        if let Some(scope) = scope {
            if !nodes.iter().any(|n| n.id == scope.0) {
                return Err(Error::StaleElement(scope.0.clone()));
            }
        }
        Ok(nodes
            .iter()
            .filter(|n| scope.map_or(true, |s| is_below(&nodes, n, &s.0)))
            .filter(|n| match by {
                By::Css(selector) => n.matches(selector),
                By::Text(text) => n.text.split_whitespace().collect::<Vec<_>>().join(" ") == *text,
            })
            .map(|n| ElementRef(n.id.clone()))
            .collect())
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        let node = self.node(element)?;
        if !node.visible {
            return Err(Error::Driver(format!("element '{}' is not interactable", node.id)));
        }
        self.shop()?.click(&node.id);
        Ok(())
    }

    async fn clear(&self, element: &ElementRef) -> Result<()> {
        let node = self.node(element)?;
        if let Some(name) = node.attrs.get("data-test") {
            self.shop()?.fields.remove(name);
        }
        Ok(())
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()> {
        let node = self.node(element)?;
        let name = node
            .attrs
            .get("data-test")
            .filter(|_| node.tag == "input")
            .ok_or_else(|| Error::Driver(format!("element '{}' does not accept text", node.id)))?;
        self.shop()?.fields.entry(name.clone()).or_default().push_str(text);
        Ok(())
    }

    async fn text(&self, element: &ElementRef) -> Result<String> {
        Ok(self.node(element)?.text)
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool> {
        Ok(self.node(element)?.visible)
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        let node = self.node(element)?;
        if name == "value" && node.tag == "input" {
            if let Some(field) = node.attrs.get("data-test") {
                return Ok(Some(self.shop()?.field(field).to_string()));
            }
        }
        Ok(node.attrs.get(name).cloned())
    }

    async fn reset_storage(&self) -> Result<()> {
        let mut shop = self.shop()?;
        shop.cart.clear();
        shop.logged_in = false;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut shop = self
            .shop
            .lock()
            .map_err(|_| Error::Driver("storefront state poisoned".to_string()))?;
        if !shop.closed {
            shop.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Launches fresh storefront sessions and counts them
#[derive(Default)]
pub struct StorefrontLauncher {
    render_delay: usize,
    launched: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl StorefrontLauncher {
    /// Pages take `render_delay` document queries to appear after each load
    pub fn with_render_delay(render_delay: usize) -> Self {
        Self {
            render_delay,
            ..Self::default()
        }
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for StorefrontLauncher {
    async fn launch(&self) -> Result<Box<dyn Browser>> {
        self.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Storefront::new(self.render_delay, Arc::clone(&self.closes))))
    }
}
