/// Shared constants: output layout, default keyword tables and identifiers
use uuid::Uuid;

use crate::domain::TargetType;

/// Fixed column order of the emitted table
pub const TABLE_HEADER: [&str; 17] = [
    "Date",
    "City",
    "Region",
    "Facility Name",
    "Target Type",
    "Damage Summary",
    "Latitude",
    "Longitude",
    "Source Channel",
    "Confidence",
    "Maritime",
    "First Message Date",
    "Last Message Date",
    "Last Event Date",
    "Source Message ID",
    "Original Text",
    "Dedup Note",
];

pub const LIST_SEPARATOR: &str = ";";
pub const EXCERPT_SEPARATOR: &str = " // ";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Channel used for a re-ingested row that lost its provenance
pub const LEDGER_CHANNEL: &str = "ledger";

/// Namespace for UUIDv5 canonical record ids
pub const RECORD_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x1c, 0x3a, 0x52, 0x94, 0x0e, 0x4b, 0x7d, 0x8a, 0x21, 0xd3, 0x5e, 0x90, 0x4c, 0x17, 0xb8,
]);

// Field names used in issues and gaps
pub const FIELD_EVENT_DATE: &str = "extracted_event_date";
pub const FIELD_MESSAGE_TIMESTAMP: &str = "message_timestamp";
pub const FIELD_RAW_TEXT: &str = "raw_text";
pub const FIELD_TARGET_TYPE: &str = "target_type";
pub const FIELD_COORDINATES: &str = "coordinates";
pub const FIELD_CONFIDENCE: &str = "extraction_confidence";
pub const FIELD_CITY: &str = "city";
pub const FIELD_REGION: &str = "region";
pub const FIELD_FACILITY: &str = "facility";
pub const FIELD_MARITIME: &str = "maritime";
pub const FIELD_CLUSTER: &str = "cluster";
pub const FIELD_NARRATIVE: &str = "narrative";

/// Extractor confidence labels mapped onto `[0, 1]`
pub const CONFIDENCE_HIGH: f64 = 0.9;
pub const CONFIDENCE_MEDIUM: f64 = 0.7;
pub const CONFIDENCE_LOW: f64 = 0.4;

/// Used when the extractor supplied no confidence at all
pub const CONFIDENCE_UNSPECIFIED: f64 = 0.5;

/// Default keyword stems per target type. Stems are matched against the
/// transliterated narrative at token starts, so Cyrillic stems work too.
pub fn default_target_keywords() -> Vec<(TargetType, Vec<&'static str>)> {
    vec![
        (
            TargetType::OilRefinery,
            vec!["refiner", "нпз", "npz", "нефтеперераб", "нафтоперероб", "нефтехим"],
        ),
        (
            TargetType::FuelDepot,
            vec![
                "fuel", "oil depot", "oil storage", "нефтебаз", "нафтобаз", "топлив", "паливн",
                "пмм",
            ],
        ),
        (
            TargetType::AmmunitionDepot,
            vec!["ammunition", "ammo", "arsenal", "арсенал", "боеприпас", "боєприпас", "munition"],
        ),
        (
            TargetType::Airfield,
            vec!["airfield", "airbase", "air base", "runway", "аэродром", "аеродром", "взлетн", "злітн"],
        ),
        (
            TargetType::Radar,
            vec!["radar", "рлс", "радар", "air defense", "air defence", "пво", "ппо", "s400", "s300"],
        ),
        (
            TargetType::PowerInfrastructure,
            vec![
                "power", "substation", "electric", "подстанц", "підстанц", "тэц", "тец", "грэс",
                "грес", "электростанц", "електростанц", "энергообъект", "енергооб",
            ],
        ),
        (
            TargetType::MilitaryBase,
            vec!["military base", "barracks", "base", "казарм", "военн", "воинск", "військов", "garrison"],
        ),
        (
            TargetType::Naval,
            vec![
                "ship", "vessel", "tanker", "fleet", "frigate", "boat", "судно", "танкер", "корабл",
                "флот", "верф", "катер",
            ],
        ),
        (
            TargetType::CommandPost,
            vec!["command post", "headquarters", "command center", "штаб", "командн", "пункт управлен"],
        ),
        (
            TargetType::Transport,
            vec!["railway", "rail", "train", "bridge", "locomotive", "железнодорож", "залізнич"],
        ),
        (
            TargetType::Industrial,
            vec!["plant", "factory", "завод", "industrial", "промышлен", "промислов"],
        ),
        (
            TargetType::Residential,
            vec!["residential", "apartment", "house", "жил", "житлов"],
        ),
    ]
}

/// Stems indicating a vessel or sea location
pub fn default_maritime_keywords() -> Vec<&'static str> {
    vec![
        "tanker", "vessel", "ship", "frigate", "offshore", "platform", "black sea", "caspian",
        "azov", "танкер", "судно", "теплоход", "сухогруз", "нефтеналивн", "платформ",
        "черное море", "чорне море", "каспийск", "каспійськ", "азовск", "азовськ",
    ]
}

/// Locations the dataset covers (Russian territory and occupied Crimea)
pub fn default_in_scope_locations() -> Vec<&'static str> {
    vec![
        "crimea", "крым", "крим", "sevastopol", "севастопол", "kerch", "керч", "dzhankoy",
        "джанкой", "feodosi", "феодоси", "saki", "russia", "россия", "росія", "belgorod",
        "белгород", "бєлгород", "bryansk", "брянск", "брянськ", "kursk", "курск", "курськ",
        "krasnodar", "краснодар", "rostov", "ростов", "voronezh", "воронеж", "ryazan", "рязан",
        "saratov", "саратов", "samara", "самар", "moscow", "москв", "novorossiysk", "новоросс",
        "tuapse", "туапсе", "black sea", "черное море", "чорне море", "caspian", "azov",
    ]
}

/// Locations that indicate strikes on Ukraine rather than by Ukraine
pub fn default_out_of_scope_locations() -> Vec<&'static str> {
    vec![
        "kharkiv", "харків", "харьков", "kyiv", "київ", "киев", "odesa", "odessa", "одес",
        "dnipro", "дніпр", "днепр", "sumy", "суми", "сумы", "zaporizhzhia", "запоріжж", "запорож",
        "lviv", "львів", "львов", "poltava", "полтав", "chernihiv", "чернігів", "чернигов",
        "mykolaiv", "миколаїв", "николаев", "kherson", "херсон",
    ]
}

/// Transliteration variants that do not collapse under the character table
pub fn default_city_aliases() -> Vec<Vec<&'static str>> {
    vec![
        vec!["voronezh", "voronizh"],
        vec!["sevastopol", "sevastopil"],
        vec!["zaporizhzhia", "zaporizhzhya", "zaporozhye", "zaporozhe"],
        vec!["dnipro", "dnepr"],
        vec!["kharkiv", "kharkov", "kharkow"],
        vec!["kyiv", "kiev", "kiyev"],
        vec!["odesa", "odessa"],
        vec!["mykolaiv", "nikolaev", "mikolayiv"],
        vec!["dzhankoi", "dzhankoy"],
        vec!["feodosia", "feodosiya", "feodosija"],
        vec!["yevpatoria", "yevpatoriya", "evpatoria"],
        vec!["simferopol", "simferopil"],
        vec!["bryansk", "briansk"],
        vec!["yekaterinburg", "ekaterinburg"],
        vec!["novorossiysk", "novorosiysk", "novorossiisk"],
    ]
}
