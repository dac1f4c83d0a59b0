//! DIDL-Lite objects
//!
//! Every object is either a [`Container`] or an [`Item`], both wrapping a
//! shared [`ObjectBase`]. Metadata without a dedicated field lands in the
//! property bag, and class-specific accessors are offered as views such as
//! [`DidlObject::as_audio_item`].

use std::time::Duration;

/// Class prefix shared by all containers
pub const CONTAINER_CLASS: &str = "object.container";
/// Class prefix shared by all items
pub const ITEM_CLASS: &str = "object.item";
/// Class prefix of audio items (tracks, broadcasts, books)
pub const AUDIO_ITEM_CLASS: &str = "object.item.audioItem";

/// A metadata element kept verbatim, e.g. `upnp:artist`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Property {
    /// Qualified name (`prefix:local`, or just `local` in the DIDL namespace)
    pub name: String,
    /// Namespace URI, when the document declared one
    pub namespace: Option<String>,
    pub value: String,
    pub attributes: Vec<(String, String)>,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A `res` element: one way to fetch the object's content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resource {
    pub uri: String,
    pub protocol_info: String,
    pub size: Option<String>,
    pub duration: Option<String>,
    pub bitrate: Option<String>,
    pub sample_frequency: Option<String>,
    pub bits_per_sample: Option<String>,
    pub nr_audio_channels: Option<String>,
    pub resolution: Option<String>,
}

impl Resource {
    pub fn new(uri: impl Into<String>, protocol_info: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            protocol_info: protocol_info.into(),
            ..Default::default()
        }
    }

    /// MIME type from the third field of `protocolInfo`
    pub fn mime_type(&self) -> Option<&str> {
        self.protocol_info
            .split(':')
            .nth(2)
            .filter(|m| !m.is_empty() && *m != "*")
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref()?.trim().parse().ok()
    }

    /// Parsed `H+:MM:SS[.F+]` duration
    pub fn playback_duration(&self) -> Option<Duration> {
        parse_duration(self.duration.as_deref()?)
    }
}

/// Fields every object carries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectBase {
    pub id: String,
    pub parent_id: String,
    pub title: String,
    pub class: String,
    pub restricted: bool,
    pub creator: Option<String>,
    pub write_status: Option<String>,
    pub resources: Vec<Resource>,
    pub properties: Vec<Property>,
}

impl ObjectBase {
    pub fn new(id: impl Into<String>, parent_id: impl Into<String>, title: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            title: title.into(),
            class: class.into(),
            ..Default::default()
        }
    }

    /// First property value with the given qualified name
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// All values of a multi-valued property, in document order
    pub fn property_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.properties
            .iter()
            .filter(move |p| p.name == name)
            .map(|p| p.value.as_str())
    }

    pub fn push_property(&mut self, property: Property) {
        self.properties.push(property);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    pub base: ObjectBase,
    pub child_count: Option<u32>,
    pub searchable: Option<bool>,
    pub search_classes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    pub base: ObjectBase,
    /// Id of the item this one references, if it is a reference
    pub ref_id: Option<String>,
}

/// A decoded DIDL-Lite object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DidlObject {
    Container(Container),
    Item(Item),
}

impl DidlObject {
    pub fn base(&self) -> &ObjectBase {
        match self {
            DidlObject::Container(c) => &c.base,
            DidlObject::Item(i) => &i.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut ObjectBase {
        match self {
            DidlObject::Container(c) => &mut c.base,
            DidlObject::Item(i) => &mut i.base,
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    pub fn parent_id(&self) -> &str {
        &self.base().parent_id
    }

    pub fn title(&self) -> &str {
        &self.base().title
    }

    pub fn class(&self) -> &str {
        &self.base().class
    }

    pub fn is_container(&self) -> bool {
        matches!(self, DidlObject::Container(_))
    }

    /// Whether the class is `prefix` or one of its subclasses
    pub fn is_class(&self, prefix: &str) -> bool {
        let class = self.class();
        class == prefix
            || class
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.'))
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            DidlObject::Container(c) => Some(c),
            DidlObject::Item(_) => None,
        }
    }

    pub fn as_item(&self) -> Option<&Item> {
        match self {
            DidlObject::Item(i) => Some(i),
            DidlObject::Container(_) => None,
        }
    }

    /// Audio view, for items of class `object.item.audioItem` or below
    pub fn as_audio_item(&self) -> Option<AudioItem<'_>> {
        match self {
            DidlObject::Item(item) if self.is_class(AUDIO_ITEM_CLASS) => Some(AudioItem { item }),
            _ => None,
        }
    }
}

/// Read-only audio accessors over an [`Item`]
#[derive(Debug, Clone, Copy)]
pub struct AudioItem<'a> {
    item: &'a Item,
}

impl<'a> AudioItem<'a> {
    pub fn item(&self) -> &'a Item {
        self.item
    }

    pub fn title(&self) -> &'a str {
        &self.item.base.title
    }

    /// `upnp:artist`, falling back to `dc:creator`
    pub fn artist(&self) -> Option<&'a str> {
        self.item
            .base
            .property("upnp:artist")
            .or(self.item.base.creator.as_deref())
    }

    pub fn album(&self) -> Option<&'a str> {
        self.item.base.property("upnp:album")
    }

    pub fn genre(&self) -> Option<&'a str> {
        self.item.base.property("upnp:genre")
    }

    pub fn album_art_uri(&self) -> Option<&'a str> {
        self.item.base.property("upnp:albumArtURI")
    }

    pub fn track_number(&self) -> Option<u32> {
        self.item
            .base
            .property("upnp:originalTrackNumber")?
            .trim()
            .parse()
            .ok()
    }

    /// Duration of the first resource declaring one
    pub fn duration(&self) -> Option<Duration> {
        self.item
            .base
            .resources
            .iter()
            .find_map(Resource::playback_duration)
    }

    pub fn resources(&self) -> &'a [Resource] {
        &self.item.base.resources
    }
}

fn parse_duration(text: &str) -> Option<Duration> {
    let mut parts = text.trim().splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    Some(Duration::from_secs(hours * 3600 + minutes * 60) + Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn track() -> DidlObject {
        let mut base = ObjectBase::new("t1", "a1", "So What", "object.item.audioItem.musicTrack");
        base.creator = Some("Miles Davis".to_string());
        base.push_property(Property::new("upnp:album", "Kind of Blue"));
        base.push_property(Property::new("upnp:originalTrackNumber", "1"));
        base.push_property(Property::new("upnp:genre", "Jazz"));
        let mut res = Resource::new("http://nas/t1.flac", "http-get:*:audio/x-flac:*");
        res.duration = Some("0:09:22.000".to_string());
        base.resources.push(res);
        DidlObject::Item(Item { base, ref_id: None })
    }

    #[test]
    fn test_audio_view() {
        let object = track();
        let audio = object.as_audio_item().unwrap();
        assert_eq!(audio.title(), "So What");
        assert_eq!(audio.artist(), Some("Miles Davis"));
        assert_eq!(audio.album(), Some("Kind of Blue"));
        assert_eq!(audio.genre(), Some("Jazz"));
        assert_eq!(audio.track_number(), Some(1));
        assert_eq!(audio.duration(), Some(Duration::from_secs(562)));
        assert_eq!(audio.resources()[0].mime_type(), Some("audio/x-flac"));
        assert!(object.as_container().is_none());
    }

    #[test]
    fn test_class_hierarchy() {
        let object = track();
        assert!(object.is_class(ITEM_CLASS));
        assert!(object.is_class(AUDIO_ITEM_CLASS));
        assert!(!object.is_class("object.item.audio"));
        assert!(!object.is_class(CONTAINER_CLASS));

        let photo = DidlObject::Item(Item {
            base: ObjectBase::new("p1", "0", "Beach", "object.item.imageItem.photo"),
            ref_id: None,
        });
        assert!(photo.as_audio_item().is_none());

        let album = DidlObject::Container(Container {
            base: ObjectBase::new("a1", "0", "Kind of Blue", "object.container.album.musicAlbum"),
            child_count: Some(5),
            ..Default::default()
        });
        assert!(album.is_container());
        assert_eq!(album.as_container().unwrap().child_count, Some(5));
        assert!(album.as_audio_item().is_none());
    }

    #[test]
    fn test_multi_valued_properties() {
        let mut base = ObjectBase::new("t2", "0", "Duet", "object.item.audioItem.musicTrack");
        base.push_property(Property::new("upnp:artist", "Ella Fitzgerald"));
        base.push_property(Property::new("upnp:artist", "Louis Armstrong"));
        let artists: Vec<&str> = base.property_values("upnp:artist").collect();
        assert_eq!(artists, vec!["Ella Fitzgerald", "Louis Armstrong"]);
        assert_eq!(base.property("upnp:artist"), Some("Ella Fitzgerald"));
    }

    #[rstest]
    #[case("0:03:58", Some(238_000))]
    #[case("1:00:00.500", Some(3_600_500))]
    #[case("12:5", None)]
    #[case("0:61:00", None)]
    #[case("garbage", None)]
    fn test_parse_duration(#[case] text: &str, #[case] millis: Option<u64>) {
        assert_eq!(
            parse_duration(text).map(|d| d.as_millis() as u64),
            millis
        );
    }

    #[test]
    fn test_resource_helpers() {
        let mut res = Resource::new("http://nas/x", "http-get:*:*:*");
        assert_eq!(res.mime_type(), None);
        res.size = Some(" 1024 ".to_string());
        assert_eq!(res.size_bytes(), Some(1024));
    }
}
